/*
[INPUT]:  Parameter trees and encoding modes
[OUTPUT]: Test results for request mutation by the parameter encoder
[POS]:    Integration tests - parameter encoding
[UPDATE]: When flattening or body encoding rules change
*/

use indexmap::IndexMap;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Request};
use rstest::rstest;
use taskwire::encoding::query;
use taskwire::{Parameter, ParameterEncoding, Parameters, PropertyListFormat};
use url::Url;

fn request(method: Method, url: &str) -> Request {
    Request::new(method, Url::parse(url).unwrap())
}

fn tree(json: serde_json::Value) -> Parameters {
    serde_json::from_value(json).unwrap()
}

fn body_of(request: &Request) -> String {
    let bytes = request.body().and_then(|body| body.as_bytes()).unwrap_or_default();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[rstest]
#[case(serde_json::json!({"foo": "bar"}), "foo=bar")]
#[case(serde_json::json!({"foo": ["bar1", "bar2"]}), "foo%5B0%5D=bar1&foo%5B1%5D=bar2")]
#[case(serde_json::json!({"foo": {"bar1": "bar2"}}), "foo%5Bbar1%5D=bar2")]
#[case(serde_json::json!({"b": 2, "a": true, "c": null}), "a=true&b=2&c=")]
fn test_raw_query_on_get(#[case] parameters: serde_json::Value, #[case] expected: &str) {
    let (encoded, error) = ParameterEncoding::RawQuery.encode(
        request(Method::GET, "https://example.com/path"),
        Some(&tree(parameters)),
    );
    assert!(error.is_none());
    assert_eq!(encoded.url().query(), Some(expected));
    assert!(encoded.headers().get(CONTENT_TYPE).is_none());
}

#[rstest]
#[case(Method::GET, true)]
#[case(Method::HEAD, true)]
#[case(Method::DELETE, true)]
#[case(Method::POST, false)]
#[case(Method::PUT, false)]
#[case(Method::PATCH, false)]
fn test_raw_query_placement(#[case] method: Method, #[case] in_url: bool) {
    let parameters = tree(serde_json::json!({"k": "v"}));
    let (encoded, _) = ParameterEncoding::RawQuery
        .encode(request(method, "https://example.com/"), Some(&parameters));

    assert_eq!(encoded.url().query().is_some(), in_url);
    assert_eq!(encoded.body().is_some(), !in_url);
}

#[test]
fn test_nil_parameters_change_nothing() {
    let original = request(Method::POST, "https://example.com/a?x=1");
    let (encoded, error) = ParameterEncoding::RawQuery.encode(original, None);
    assert!(error.is_none());
    assert_eq!(encoded.url().as_str(), "https://example.com/a?x=1");
    assert!(encoded.body().is_none());
    assert!(encoded.headers().get(CONTENT_TYPE).is_none());
}

#[test]
fn test_query_round_trip_recovers_tree() {
    let parameters = tree(serde_json::json!({
        "zeta": "last",
        "alpha": {"second": "2", "first": "1"},
        "list": ["x y", "a&b"],
    }));
    let (encoded, _) = ParameterEncoding::RawQuery
        .encode(request(Method::GET, "https://example.com/"), Some(&parameters));

    let decoded: Vec<(String, String)> = encoded
        .url()
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    assert_eq!(
        decoded,
        vec![
            ("alpha[second]".to_string(), "2".to_string()),
            ("alpha[first]".to_string(), "1".to_string()),
            ("list[0]".to_string(), "x y".to_string()),
            ("list[1]".to_string(), "a&b".to_string()),
            ("zeta".to_string(), "last".to_string()),
        ]
    );
}

#[test]
fn test_json_body_round_trip() {
    let parameters = tree(serde_json::json!({
        "name": "widget",
        "count": 3,
        "price": 9.5,
        "nested": {"on": true, "tags": ["a", "b"]},
        "nothing": null,
    }));
    let (encoded, error) = ParameterEncoding::JsonBody
        .encode(request(Method::POST, "https://example.com/"), Some(&parameters));

    assert!(error.is_none());
    assert_eq!(encoded.headers().get(CONTENT_TYPE).unwrap(), "application/json");
    let decoded: Parameters = serde_json::from_str(&body_of(&encoded)).unwrap();
    assert_eq!(decoded, parameters);
}

#[test]
fn test_property_list_body_sets_content_type() {
    let parameters = tree(serde_json::json!({"b": 1, "a": "x"}));
    let (encoded, error) = ParameterEncoding::property_list(PropertyListFormat::Xml)
        .encode(request(Method::PUT, "https://example.com/"), Some(&parameters));

    assert!(error.is_none());
    assert_eq!(encoded.headers().get(CONTENT_TYPE).unwrap(), "application/x-plist");
    let body = body_of(&encoded);
    assert!(body.contains("<key>a</key>"));
    assert!(body.contains("<integer>1</integer>"));
}

#[test]
fn test_serialization_failure_is_fail_open() {
    let mut parameters = IndexMap::new();
    parameters.insert("bad".to_string(), Parameter::Float(f64::NAN));
    let original = request(Method::POST, "https://example.com/submit");

    let (encoded, error) = ParameterEncoding::JsonBody.encode(original, Some(&parameters));

    assert!(error.unwrap().is_encoding_error());
    assert!(encoded.body().is_none());
    assert!(encoded.headers().get(CONTENT_TYPE).is_none());
    assert_eq!(encoded.url().as_str(), "https://example.com/submit");
}

#[test]
fn test_flatten_and_escape_are_public() {
    let value = Parameter::from(vec!["a b"]);
    assert_eq!(
        query::flatten("k", &value),
        vec![("k%5B0%5D".to_string(), "a%20b".to_string())]
    );
    assert_eq!(query::escape(":/?&=;+!@#$()',*"), "%3A%2F%3F%26%3D%3B%2B%21%40%23%24%28%29%27%2C%2A");
}
