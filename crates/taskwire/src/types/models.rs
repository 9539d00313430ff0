/*
[INPUT]:  Transport requests and responses, authentication material
[OUTPUT]: Cloneable request/response heads, credentials, challenges, cache entries
[POS]:    Data layer - values exchanged between transport, router and delegates
[UPDATE]: When events need to carry new request or response details
*/

use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use reqwest::{Method, Request, Response, StatusCode};
use url::Url;

use super::enums::AuthenticationMethod;

/// Method, URL and headers of a request, without its body
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHead {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
        }
    }

    pub fn from_request(request: &Request) -> Self {
        Self {
            method: request.method().clone(),
            url: request.url().clone(),
            headers: request.headers().clone(),
        }
    }

    /// Build a body-less transport request from this head
    pub fn to_request(&self) -> Request {
        let mut request = Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        request
    }
}

/// Status line and headers of a received response
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHead {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            url,
            status,
            headers,
        }
    }

    pub fn from_response(response: &Response) -> Self {
        Self {
            url: response.url().clone(),
            status: response.status(),
            headers: response.headers().clone(),
        }
    }

    /// Declared body length, when the server sent one
    pub fn expected_content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
    }

    /// Media type without parameters, lowercased
    pub fn mime_type(&self) -> Option<String> {
        let content_type = self.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        let mime = content_type.split(';').next()?.trim();
        if mime.is_empty() {
            None
        } else {
            Some(mime.to_ascii_lowercase())
        }
    }

    /// `charset` parameter of the Content-Type header
    pub fn text_encoding_name(&self) -> Option<String> {
        let content_type = self.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        content_type.split(';').skip(1).find_map(|param| {
            let (name, value) = param.split_once('=')?;
            if name.trim().eq_ignore_ascii_case("charset") {
                Some(value.trim().trim_matches('"').to_ascii_lowercase())
            } else {
                None
            }
        })
    }
}

/// Authentication material attached to a task or stored per protection space
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// User name and password
    UserPassword { user: String, password: String },
    /// Acceptance of the server's trust chain for a host
    ServerTrust { host: String },
    /// Opaque credential object handed through to the transport
    Opaque(Bytes),
}

impl Credential {
    pub fn user_password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::UserPassword {
            user: user.into(),
            password: password.into(),
        }
    }
}

/// Host, port, realm and scheme a challenge applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtectionSpace {
    pub host: String,
    pub port: Option<u16>,
    pub realm: Option<String>,
    pub method: AuthenticationMethod,
}

impl ProtectionSpace {
    pub fn for_url(url: &Url, realm: Option<String>, method: AuthenticationMethod) -> Self {
        Self {
            host: url.host_str().unwrap_or_default().to_string(),
            port: url.port_or_known_default(),
            realm,
            method,
        }
    }
}

/// Authentication challenge raised by the transport for a task
#[derive(Debug, Clone, PartialEq)]
pub struct AuthChallenge {
    pub protection_space: ProtectionSpace,
    /// Number of earlier attempts on this challenge that failed
    pub previous_failure_count: u32,
    pub proposed_credential: Option<Credential>,
    pub failure_response: Option<ResponseHead>,
}

/// Where a cached response may be kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStoragePolicy {
    Allowed,
    AllowedInMemoryOnly,
    NotAllowed,
}

/// Completed response offered to the cache hook
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub response: ResponseHead,
    pub data: Bytes,
    pub storage: CacheStoragePolicy,
}
