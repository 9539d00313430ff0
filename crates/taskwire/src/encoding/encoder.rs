/*
[INPUT]:  Transport request, optional parameter tree, encoding mode
[OUTPUT]: Mutated request (query or body + Content-Type) and optional encoding error
[POS]:    Encoding layer - applies parameters to requests
[UPDATE]: When adding encoding modes or changing header rules
*/

use std::fmt;
use std::sync::Arc;

use reqwest::Request;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use tracing::warn;

use crate::error::TaskwireError;
use crate::types::{HttpMethod, Parameter, Parameters, PropertyListFormat};

use super::query;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";
const PLIST_CONTENT_TYPE: &str = "application/x-plist";

/// Caller-supplied encoder: receives the request and the raw tree, returns the
/// finished request and an optional error
pub type CustomEncoder =
    Arc<dyn Fn(Request, &Parameters) -> (Request, Option<TaskwireError>) + Send + Sync>;

/// Writer options for property list bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyListOptions {
    /// Emit dictionary keys in lexicographic order instead of insertion order
    pub sort_keys: bool,
}

/// How a parameter tree becomes part of a request
#[derive(Clone, Default)]
pub enum ParameterEncoding {
    /// Query string for GET/HEAD/DELETE, form body otherwise
    #[default]
    RawQuery,
    /// Query string appended to the URL for every method
    QueryInUrl,
    /// Tree serialized as a JSON body
    JsonBody,
    /// Tree serialized as a property list body
    PropertyListBody {
        format: PropertyListFormat,
        options: PropertyListOptions,
    },
    /// Encoding delegated to a caller function
    CustomBody(CustomEncoder),
}

impl fmt::Debug for ParameterEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterEncoding::RawQuery => f.write_str("RawQuery"),
            ParameterEncoding::QueryInUrl => f.write_str("QueryInUrl"),
            ParameterEncoding::JsonBody => f.write_str("JsonBody"),
            ParameterEncoding::PropertyListBody { format, options } => f
                .debug_struct("PropertyListBody")
                .field("format", format)
                .field("options", options)
                .finish(),
            ParameterEncoding::CustomBody(_) => f.write_str("CustomBody(..)"),
        }
    }
}

impl ParameterEncoding {
    pub fn property_list(format: PropertyListFormat) -> Self {
        ParameterEncoding::PropertyListBody {
            format,
            options: PropertyListOptions::default(),
        }
    }

    pub fn custom<F>(encoder: F) -> Self
    where
        F: Fn(Request, &Parameters) -> (Request, Option<TaskwireError>) + Send + Sync + 'static,
    {
        ParameterEncoding::CustomBody(Arc::new(encoder))
    }

    /// Apply `parameters` to `request`.
    ///
    /// Absent parameters leave the request untouched. When serialization
    /// fails the original request comes back unmodified next to the error;
    /// the request is never dropped.
    pub fn encode(
        &self,
        mut request: Request,
        parameters: Option<&Parameters>,
    ) -> (Request, Option<TaskwireError>) {
        let Some(parameters) = parameters else {
            return (request, None);
        };

        match self {
            ParameterEncoding::RawQuery | ParameterEncoding::QueryInUrl => {
                let encoded = query::query_string(parameters);
                if encoded.is_empty() {
                    return (request, None);
                }
                let in_url = matches!(self, ParameterEncoding::QueryInUrl)
                    || HttpMethod::from_method(request.method())
                        .map(HttpMethod::encodes_in_url)
                        .unwrap_or(false);
                if in_url {
                    append_query(&mut request, &encoded);
                } else {
                    if !request.headers().contains_key(CONTENT_TYPE) {
                        request
                            .headers_mut()
                            .insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
                    }
                    *request.body_mut() = Some(encoded.into_bytes().into());
                }
                (request, None)
            }
            ParameterEncoding::JsonBody => match encode_json(parameters) {
                Ok(body) => {
                    request
                        .headers_mut()
                        .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
                    *request.body_mut() = Some(body.into());
                    (request, None)
                }
                Err(err) => encoding_failed(request, err),
            },
            ParameterEncoding::PropertyListBody { format, options } => {
                match encode_property_list(parameters, *format, *options) {
                    Ok(body) => {
                        request
                            .headers_mut()
                            .insert(CONTENT_TYPE, HeaderValue::from_static(PLIST_CONTENT_TYPE));
                        *request.body_mut() = Some(body.into());
                        (request, None)
                    }
                    Err(err) => encoding_failed(request, err),
                }
            }
            ParameterEncoding::CustomBody(encoder) => encoder(request, parameters),
        }
    }
}

fn append_query(request: &mut Request, encoded: &str) {
    let url = request.url_mut();
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
        _ => encoded.to_string(),
    };
    url.set_query(Some(&query));
}

fn encoding_failed(request: Request, err: TaskwireError) -> (Request, Option<TaskwireError>) {
    warn!(url = %request.url(), error = %err, "parameter encoding failed");
    (request, Some(err))
}

fn encode_json(parameters: &Parameters) -> Result<Vec<u8>, TaskwireError> {
    if !parameters.values().all(Parameter::is_finite) {
        return Err(TaskwireError::Encoding(
            "JSON cannot represent non-finite numbers".to_string(),
        ));
    }
    serde_json::to_vec(parameters).map_err(|err| TaskwireError::Encoding(err.to_string()))
}

fn encode_property_list(
    parameters: &Parameters,
    format: PropertyListFormat,
    options: PropertyListOptions,
) -> Result<Vec<u8>, TaskwireError> {
    let dictionary = crate::types::parameter::map_to_plist(parameters, options.sort_keys)
        .map_err(TaskwireError::Encoding)?;
    let value = plist::Value::Dictionary(dictionary);

    let mut body = Vec::new();
    let written = match format {
        PropertyListFormat::Xml => value.to_writer_xml(&mut body),
        PropertyListFormat::Binary => value.to_writer_binary(&mut body),
    };
    written.map_err(|err| TaskwireError::Encoding(err.to_string()))?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use url::Url;

    fn request(method: Method, url: &str) -> Request {
        Request::new(method, Url::parse(url).unwrap())
    }

    fn params(entries: Vec<(&str, Parameter)>) -> Parameters {
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }

    fn body_of(request: &Request) -> Vec<u8> {
        request
            .body()
            .and_then(|body| body.as_bytes())
            .map(|bytes| bytes.to_vec())
            .unwrap_or_default()
    }

    #[test]
    fn test_absent_parameters_leave_request_unchanged() {
        let (encoded, error) =
            ParameterEncoding::RawQuery.encode(request(Method::POST, "https://example.com/"), None);
        assert!(error.is_none());
        assert!(encoded.url().query().is_none());
        assert!(encoded.body().is_none());
        assert!(!encoded.headers().contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_get_appends_query() {
        let parameters = params(vec![("foo", "bar".into())]);
        let (encoded, error) = ParameterEncoding::RawQuery
            .encode(request(Method::GET, "https://example.com/"), Some(&parameters));
        assert!(error.is_none());
        assert_eq!(encoded.url().query(), Some("foo=bar"));
        assert!(encoded.body().is_none());
    }

    #[test]
    fn test_existing_query_is_preserved() {
        let parameters = params(vec![("foo1", "bar1".into())]);
        let (encoded, _) = ParameterEncoding::RawQuery.encode(
            request(Method::GET, "https://example.com/?foo=bar"),
            Some(&parameters),
        );
        assert_eq!(encoded.url().query(), Some("foo=bar&foo1=bar1"));
    }

    #[test]
    fn test_delete_uses_url() {
        let parameters = params(vec![("id", 7.into())]);
        let (encoded, _) = ParameterEncoding::RawQuery
            .encode(request(Method::DELETE, "https://example.com/item"), Some(&parameters));
        assert_eq!(encoded.url().query(), Some("id=7"));
    }

    #[test]
    fn test_post_becomes_form_body() {
        let parameters = params(vec![("foo", "bar".into()), ("baz", vec!["a", "b"].into())]);
        let (encoded, error) = ParameterEncoding::RawQuery
            .encode(request(Method::POST, "https://example.com/"), Some(&parameters));
        assert!(error.is_none());
        assert!(encoded.url().query().is_none());
        assert_eq!(
            encoded.headers().get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(body_of(&encoded), b"baz%5B0%5D=a&baz%5B1%5D=b&foo=bar");
    }

    #[test]
    fn test_form_body_keeps_existing_content_type() {
        let parameters = params(vec![("foo", "bar".into())]);
        let mut original = request(Method::PUT, "https://example.com/");
        original
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let (encoded, _) = ParameterEncoding::RawQuery.encode(original, Some(&parameters));
        assert_eq!(encoded.headers().get(CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[test]
    fn test_query_in_url_for_post() {
        let parameters = params(vec![("foo", "bar".into())]);
        let (encoded, _) = ParameterEncoding::QueryInUrl
            .encode(request(Method::POST, "https://example.com/"), Some(&parameters));
        assert_eq!(encoded.url().query(), Some("foo=bar"));
        assert!(encoded.body().is_none());
    }

    #[test]
    fn test_json_body_roundtrip() {
        let nested: Parameter = [("x", Parameter::from(1)), ("y", Parameter::from(vec![true, false]))]
            .into_iter()
            .collect();
        let parameters = params(vec![
            ("foo", "bar".into()),
            ("nested", nested),
            ("ratio", 0.5.into()),
            ("nothing", Parameter::Null),
        ]);
        let mut original = request(Method::POST, "https://example.com/");
        original
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let (encoded, error) = ParameterEncoding::JsonBody.encode(original, Some(&parameters));
        assert!(error.is_none());
        assert_eq!(encoded.headers().get(CONTENT_TYPE).unwrap(), "application/json");

        let decoded: Parameters = serde_json::from_slice(&body_of(&encoded)).unwrap();
        assert_eq!(decoded, parameters);
    }

    #[test]
    fn test_json_failure_returns_unmodified_request() {
        let parameters = params(vec![("bad", f64::INFINITY.into())]);
        let (encoded, error) = ParameterEncoding::JsonBody
            .encode(request(Method::POST, "https://example.com/"), Some(&parameters));
        assert!(matches!(error, Some(TaskwireError::Encoding(_))));
        assert!(encoded.body().is_none());
        assert!(!encoded.headers().contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_property_list_body() {
        let parameters = params(vec![("foo", "bar".into()), ("count", 2.into())]);
        let (encoded, error) = ParameterEncoding::property_list(PropertyListFormat::Xml)
            .encode(request(Method::POST, "https://example.com/"), Some(&parameters));
        assert!(error.is_none());
        assert_eq!(encoded.headers().get(CONTENT_TYPE).unwrap(), "application/x-plist");

        let body = body_of(&encoded);
        let value = plist::Value::from_reader(std::io::Cursor::new(body)).unwrap();
        let dictionary = value.as_dictionary().unwrap();
        assert_eq!(dictionary.get("foo").and_then(|v| v.as_string()), Some("bar"));
        assert_eq!(
            dictionary.get("count").and_then(|v| v.as_signed_integer()),
            Some(2)
        );
    }

    #[test]
    fn test_property_list_binary_sorted() {
        let parameters = params(vec![("b", "2".into()), ("a", "1".into())]);
        let encoding = ParameterEncoding::PropertyListBody {
            format: PropertyListFormat::Binary,
            options: PropertyListOptions { sort_keys: true },
        };
        let (encoded, error) =
            encoding.encode(request(Method::PUT, "https://example.com/"), Some(&parameters));
        assert!(error.is_none());
        let body = body_of(&encoded);
        assert!(body.starts_with(b"bplist00"));
        let value = plist::Value::from_reader(std::io::Cursor::new(body)).unwrap();
        let keys: Vec<&String> = value.as_dictionary().unwrap().keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_property_list_null_fails_open() {
        let parameters = params(vec![("gone", Parameter::Null)]);
        let (encoded, error) = ParameterEncoding::property_list(PropertyListFormat::Xml)
            .encode(request(Method::POST, "https://example.com/"), Some(&parameters));
        assert!(error.unwrap().is_encoding_error());
        assert!(encoded.body().is_none());
    }

    #[test]
    fn test_custom_encoder_receives_tree() {
        let encoding = ParameterEncoding::custom(|mut request, parameters| {
            let header = format!("{}", parameters.len());
            request
                .headers_mut()
                .insert("x-parameter-count", HeaderValue::from_str(&header).unwrap());
            (request, None)
        });
        let parameters = params(vec![("a", "1".into()), ("b", "2".into())]);
        let (encoded, error) =
            encoding.encode(request(Method::POST, "https://example.com/"), Some(&parameters));
        assert!(error.is_none());
        assert_eq!(encoded.headers().get("x-parameter-count").unwrap(), "2");
    }

    #[test]
    fn test_custom_encoder_error_is_returned() {
        let encoding = ParameterEncoding::custom(|request, _| {
            (request, Some(TaskwireError::Encoding("custom failure".into())))
        });
        let parameters = params(vec![("a", "1".into())]);
        let (_, error) =
            encoding.encode(request(Method::POST, "https://example.com/"), Some(&parameters));
        assert_eq!(error.unwrap().to_string(), "Parameter encoding failed: custom failure");
    }
}
