/*
[INPUT]:  Optional response head and completed body bytes
[OUTPUT]: Decoded values (bytes, text, JSON, property list, custom) or decode errors
[POS]:    Response layer - response transforms
[UPDATE]: When adding a built-in decoder
*/

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::StatusCode;
use serde::de::{DeserializeOwned, Error as _};

use crate::error::TaskwireError;
use crate::types::ResponseHead;

type TransformFn<T> =
    dyn Fn(Option<&ResponseHead>, Option<&Bytes>) -> (Option<T>, Option<TaskwireError>) + Send + Sync;

/// Terminal transform turning a task's bytes into a value
pub struct Transform<T> {
    inner: Arc<TransformFn<T>>,
}

impl<T> Clone for Transform<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Transform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transform(..)")
    }
}

/// Text encodings the string transform can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Latin1,
}

impl Charset {
    /// Map a `charset` label; unknown labels yield `None`
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "us-ascii" | "ascii" => {
                Some(Charset::Latin1)
            }
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Latin1 => "iso-8859-1",
        }
    }

    fn decode(self, data: &[u8]) -> Option<String> {
        match self {
            Charset::Utf8 => String::from_utf8(data.to_vec()).ok(),
            Charset::Latin1 => Some(data.iter().map(|&byte| char::from(byte)).collect()),
        }
    }
}

/// JSON decoding options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonOptions {
    /// Accept a top-level scalar instead of requiring an object or array
    pub allow_fragments: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            allow_fragments: true,
        }
    }
}

/// Body bytes to decode; an empty body only passes for 204/205
fn payload<'a>(
    response: Option<&ResponseHead>,
    data: Option<&'a Bytes>,
) -> Result<Option<&'a Bytes>, TaskwireError> {
    match data {
        Some(data) if !data.is_empty() => Ok(Some(data)),
        _ => {
            let empty_allowed = response.is_some_and(|response| {
                matches!(response.status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT)
            });
            if empty_allowed {
                Ok(None)
            } else {
                Err(TaskwireError::EmptyResponse)
            }
        }
    }
}

fn outcome<T>(result: Result<Option<T>, TaskwireError>) -> (Option<T>, Option<TaskwireError>) {
    match result {
        Ok(value) => (value, None),
        Err(err) => (None, Some(err)),
    }
}

impl<T> Transform<T> {
    /// Wrap a caller-supplied transform
    pub fn custom<F>(transform: F) -> Self
    where
        F: Fn(Option<&ResponseHead>, Option<&Bytes>) -> (Option<T>, Option<TaskwireError>)
            + Send
            + Sync
            + 'static,
    {
        Self {
            inner: Arc::new(transform),
        }
    }

    pub fn apply(
        &self,
        response: Option<&ResponseHead>,
        data: Option<&Bytes>,
    ) -> (Option<T>, Option<TaskwireError>) {
        (self.inner)(response, data)
    }
}

impl Transform<Bytes> {
    /// Raw body bytes
    pub fn bytes() -> Self {
        Self::custom(|response, data| outcome(payload(response, data).map(|data| data.cloned())))
    }
}

impl Transform<String> {
    /// Decode text with `charset`, else the response's declared charset,
    /// else ISO-8859-1
    pub fn string(charset: Option<Charset>) -> Self {
        Self::custom(move |response, data| {
            outcome(payload(response, data).and_then(|data| {
                let Some(data) = data else {
                    return Ok(Some(String::new()));
                };
                let charset = match charset {
                    Some(charset) => charset,
                    None => match response.and_then(ResponseHead::text_encoding_name) {
                        Some(label) => Charset::from_label(&label)
                            .ok_or(TaskwireError::StringDecoding { charset: label })?,
                        None => Charset::Latin1,
                    },
                };
                charset
                    .decode(data)
                    .map(Some)
                    .ok_or_else(|| TaskwireError::StringDecoding {
                        charset: charset.label().to_string(),
                    })
            }))
        })
    }
}

impl<T: DeserializeOwned> Transform<T> {
    /// Decode a JSON document into `T`
    pub fn json(options: JsonOptions) -> Self {
        Self::custom(move |response, data| {
            outcome(payload(response, data).and_then(|data| {
                let Some(data) = data else {
                    return Ok(None);
                };
                let document: serde_json::Value = serde_json::from_slice(data)?;
                if !options.allow_fragments && !(document.is_object() || document.is_array()) {
                    return Err(serde_json::Error::custom("top-level JSON value is not an object or array").into());
                }
                Ok(Some(serde_json::from_value(document)?))
            }))
        })
    }
}

impl Transform<plist::Value> {
    /// Decode an XML or binary property list
    pub fn property_list() -> Self {
        Self::custom(|response, data| {
            outcome(payload(response, data).and_then(|data| match data {
                Some(data) => Ok(Some(plist::Value::from_reader(Cursor::new(data.as_ref()))?)),
                None => Ok(None),
            }))
        })
    }
}
