/*
[INPUT]:  Parameter trees
[OUTPUT]: Percent-encoded `key=value` pairs and query strings
[POS]:    Encoding layer - flattening of nested parameters
[UPDATE]: When changing key bracketing, ordering or escaping rules
*/

use crate::types::{Parameter, Parameters};

/// Characters that are always percent-encoded in keys and values, on top of
/// everything outside the RFC 3986 unreserved set.
pub const RESERVED_CHARACTERS: &str = ":/?&=;+!@#$()',*";

/// Percent-encode a key or value component.
///
/// Only ASCII alphanumerics and `-._~` survive unescaped, which covers
/// [`RESERVED_CHARACTERS`] as well as brackets and non-ASCII input.
pub fn escape(component: &str) -> String {
    urlencoding::encode(component).into_owned()
}

/// Flatten one parameter under `key` into escaped pairs.
///
/// Sequences nest as `key[index]`, mappings as `key[child]` in the mapping's
/// own order.
pub fn flatten(key: &str, value: &Parameter) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    push_components(key, value, &mut pairs);
    pairs
}

fn push_components(key: &str, value: &Parameter, pairs: &mut Vec<(String, String)>) {
    match value {
        Parameter::Object(map) => {
            for (child, nested) in map {
                push_components(&format!("{key}[{child}]"), nested, pairs);
            }
        }
        Parameter::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                push_components(&format!("{key}[{index}]"), nested, pairs);
            }
        }
        scalar => {
            let text = scalar.scalar_string().unwrap_or_default();
            pairs.push((escape(key), escape(&text)));
        }
    }
}

/// All pairs for a top-level mapping; top-level keys are visited sorted
pub fn pairs(parameters: &Parameters) -> Vec<(String, String)> {
    let mut keys: Vec<&String> = parameters.keys().collect();
    keys.sort();

    let mut pairs = Vec::new();
    for key in keys {
        if let Some(value) = parameters.get(key) {
            push_components(key, value, &mut pairs);
        }
    }
    pairs
}

/// Join the flattened pairs as `key=value&key=value`
pub fn query_string(parameters: &Parameters) -> String {
    pairs(parameters)
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn params(entries: Vec<(&str, Parameter)>) -> Parameters {
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }

    #[test]
    fn test_single_pair() {
        let parameters = params(vec![("foo", "bar".into())]);
        assert_eq!(query_string(&parameters), "foo=bar");
    }

    #[test]
    fn test_sequence_uses_indices() {
        let parameters = params(vec![("foo", vec!["bar1", "bar2"].into())]);
        assert_eq!(query_string(&parameters), "foo%5B0%5D=bar1&foo%5B1%5D=bar2");
    }

    #[test]
    fn test_nested_mapping() {
        let nested: Parameter = [("bar1", "bar2")].into_iter().collect();
        let parameters = params(vec![("foo", nested)]);
        assert_eq!(query_string(&parameters), "foo%5Bbar1%5D=bar2");
    }

    #[test]
    fn test_top_level_keys_sorted() {
        let parameters = params(vec![
            ("zeta", "1".into()),
            ("alpha", "2".into()),
            ("mid", "3".into()),
        ]);
        assert_eq!(query_string(&parameters), "alpha=2&mid=3&zeta=1");
    }

    #[test]
    fn test_nested_keys_keep_mapping_order() {
        let mut nested = IndexMap::new();
        nested.insert("zeta".to_string(), Parameter::from("1"));
        nested.insert("alpha".to_string(), Parameter::from("2"));
        let parameters = params(vec![("outer", Parameter::Object(nested))]);
        assert_eq!(
            query_string(&parameters),
            "outer%5Bzeta%5D=1&outer%5Balpha%5D=2"
        );
    }

    #[test]
    fn test_reserved_characters_escaped() {
        for reserved in RESERVED_CHARACTERS.chars() {
            let escaped = escape(&reserved.to_string());
            assert!(escaped.starts_with('%'), "{reserved} was not escaped");
        }
        assert_eq!(escape("a b"), "a%20b");
        assert_eq!(escape("-._~"), "-._~");
        assert_eq!(escape("日本"), "%E6%97%A5%E6%9C%AC");
    }

    #[test]
    fn test_deep_nesting() {
        let inner: Parameter = [("c", Parameter::from(vec![1, 2]))].into_iter().collect();
        let outer: Parameter = [("b", inner)].into_iter().collect();
        let pairs = flatten("a", &outer);
        assert_eq!(
            pairs,
            vec![
                ("a%5Bb%5D%5Bc%5D%5B0%5D".to_string(), "1".to_string()),
                ("a%5Bb%5D%5Bc%5D%5B1%5D".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_containers_produce_nothing() {
        let parameters = params(vec![
            ("list", Parameter::Array(Vec::new())),
            ("map", Parameter::Object(IndexMap::new())),
        ]);
        assert_eq!(query_string(&parameters), "");
    }
}
