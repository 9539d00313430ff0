/*
[INPUT]:  HTTP method names, task kinds, hook decisions
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - closed enumerations shared by every layer
[UPDATE]: When adding methods, task kinds or hook outcomes
*/

use reqwest::Method;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Options,
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Trace,
    Connect,
}

impl HttpMethod {
    /// Methods whose raw-query parameters travel in the URL rather than the body
    pub fn encodes_in_url(self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Delete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
        }
    }

    /// Map a transport method back to the closed set, if it belongs to it
    pub fn from_method(method: &Method) -> Option<Self> {
        let parsed = match method.as_str() {
            "OPTIONS" => HttpMethod::Options,
            "GET" => HttpMethod::Get,
            "HEAD" => HttpMethod::Head,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "PATCH" => HttpMethod::Patch,
            "DELETE" => HttpMethod::Delete,
            "TRACE" => HttpMethod::Trace,
            "CONNECT" => HttpMethod::Connect,
            _ => return None,
        };
        Some(parsed)
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Options => Method::OPTIONS,
            HttpMethod::Get => Method::GET,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Trace => Method::TRACE,
            HttpMethod::Connect => Method::CONNECT,
        }
    }
}

/// Delegate variant owning a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Plain,
    Data,
    Download,
    Upload,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Plain => "plain",
            TaskKind::Data => "data",
            TaskKind::Download => "download",
            TaskKind::Upload => "upload",
        }
    }
}

/// What the transport should do with a response it just received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    Allow,
    Cancel,
    BecomeDownload,
}

/// Answer to an authentication challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeDisposition {
    UseCredential,
    PerformDefaultHandling,
    CancelChallenge,
    RejectProtectionSpace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationMethod {
    HttpBasic,
    HttpDigest,
    ServerTrust,
    Other,
}

/// Serialized layout of a property list body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyListFormat {
    #[default]
    Xml,
    Binary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encoded_methods() {
        assert!(HttpMethod::Get.encodes_in_url());
        assert!(HttpMethod::Head.encodes_in_url());
        assert!(HttpMethod::Delete.encodes_in_url());
        assert!(!HttpMethod::Post.encodes_in_url());
        assert!(!HttpMethod::Put.encodes_in_url());
        assert!(!HttpMethod::Options.encodes_in_url());
    }

    #[test]
    fn test_method_conversion() {
        for method in [
            HttpMethod::Options,
            HttpMethod::Get,
            HttpMethod::Head,
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Patch,
            HttpMethod::Delete,
            HttpMethod::Trace,
            HttpMethod::Connect,
        ] {
            let transport: Method = method.into();
            assert_eq!(transport.as_str(), method.as_str());
            assert_eq!(HttpMethod::from_method(&transport), Some(method));
        }
    }

    #[test]
    fn test_method_serde_uppercase() {
        let json = serde_json::to_string(&HttpMethod::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");
        let parsed: HttpMethod = serde_json::from_str("\"PATCH\"").unwrap();
        assert_eq!(parsed, HttpMethod::Patch);
    }
}
