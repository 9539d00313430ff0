/*
[INPUT]:  Caller-supplied request parameters
[OUTPUT]: Recursive parameter tree (scalar / sequence / mapping)
[POS]:    Data layer - input of the parameter encoder
[UPDATE]: When adding scalar kinds or conversions
*/

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Top-level parameters: a mapping from key to parameter tree
pub type Parameters = IndexMap<String, Parameter>;

/// One node of a parameter tree.
///
/// Mappings keep insertion order; the query encoder sorts only the
/// top level, nested mappings are walked in this order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parameter {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Parameter>),
    Object(IndexMap<String, Parameter>),
}

impl Parameter {
    /// String form used in query pairs; `None` for sequences and mappings
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            Parameter::Null => Some(String::new()),
            Parameter::Bool(value) => Some(value.to_string()),
            Parameter::Int(value) => Some(value.to_string()),
            Parameter::Float(value) => Some(float_string(*value)),
            Parameter::String(value) => Some(value.clone()),
            Parameter::Array(_) | Parameter::Object(_) => None,
        }
    }

    /// True when every float in the tree is finite
    pub fn is_finite(&self) -> bool {
        match self {
            Parameter::Float(value) => value.is_finite(),
            Parameter::Array(items) => items.iter().all(Parameter::is_finite),
            Parameter::Object(map) => map.values().all(Parameter::is_finite),
            _ => true,
        }
    }

    /// Convert into a property list value; property lists have no null
    pub fn to_plist(&self, sort_keys: bool) -> Result<plist::Value, String> {
        let value = match self {
            Parameter::Null => return Err("property lists cannot represent null".to_string()),
            Parameter::Bool(value) => plist::Value::Boolean(*value),
            Parameter::Int(value) => plist::Value::Integer((*value).into()),
            Parameter::Float(value) => plist::Value::Real(*value),
            Parameter::String(value) => plist::Value::String(value.clone()),
            Parameter::Array(items) => plist::Value::Array(
                items
                    .iter()
                    .map(|item| item.to_plist(sort_keys))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Parameter::Object(map) => plist::Value::Dictionary(map_to_plist(map, sort_keys)?),
        };
        Ok(value)
    }
}

/// Whole-number floats keep a `.0` so they stay distinct from integers
fn float_string(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

pub(crate) fn map_to_plist(
    map: &IndexMap<String, Parameter>,
    sort_keys: bool,
) -> Result<plist::Dictionary, String> {
    let mut entries: Vec<(&String, &Parameter)> = map.iter().collect();
    if sort_keys {
        entries.sort_by(|a, b| a.0.cmp(b.0));
    }
    let mut dictionary = plist::Dictionary::new();
    for (key, value) in entries {
        dictionary.insert(key.clone(), value.to_plist(sort_keys)?);
    }
    Ok(dictionary)
}

impl From<&str> for Parameter {
    fn from(value: &str) -> Self {
        Parameter::String(value.to_string())
    }
}

impl From<String> for Parameter {
    fn from(value: String) -> Self {
        Parameter::String(value)
    }
}

impl From<bool> for Parameter {
    fn from(value: bool) -> Self {
        Parameter::Bool(value)
    }
}

impl From<i64> for Parameter {
    fn from(value: i64) -> Self {
        Parameter::Int(value)
    }
}

impl From<i32> for Parameter {
    fn from(value: i32) -> Self {
        Parameter::Int(value.into())
    }
}

impl From<u32> for Parameter {
    fn from(value: u32) -> Self {
        Parameter::Int(value.into())
    }
}

impl From<f64> for Parameter {
    fn from(value: f64) -> Self {
        Parameter::Float(value)
    }
}

impl<T: Into<Parameter>> From<Vec<T>> for Parameter {
    fn from(values: Vec<T>) -> Self {
        Parameter::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Parameter>> for Parameter {
    fn from(map: IndexMap<String, Parameter>) -> Self {
        Parameter::Object(map)
    }
}

impl<K: Into<String>, V: Into<Parameter>> FromIterator<(K, V)> for Parameter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Parameter::Object(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}
