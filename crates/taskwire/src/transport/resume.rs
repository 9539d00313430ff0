/*
[INPUT]:  Partially written download state
[OUTPUT]: Opaque resume blob (JSON) and the ranged request that continues it
[POS]:    Transport seam - resumable download format
[UPDATE]: When adding validators or changing the blob layout
*/

use std::path::PathBuf;

use bytes::Bytes;
use reqwest::header::{HeaderValue, IF_RANGE, RANGE};
use reqwest::{Method, Request};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, TaskwireError};

/// State needed to continue a cancelled download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeData {
    pub url: Url,
    pub temp_path: PathBuf,
    pub offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl ResumeData {
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|err| TaskwireError::MalformedRequest(format!("invalid resume data: {err}")))
    }

    /// Validator for `If-Range`, strong ETag preferred
    pub fn validator(&self) -> Option<&str> {
        self.etag.as_deref().or(self.last_modified.as_deref())
    }

    /// GET request asking for the remaining bytes
    pub fn request(&self) -> Result<Request> {
        let mut request = Request::new(Method::GET, self.url.clone());
        let range = HeaderValue::from_str(&format!("bytes={}-", self.offset))
            .map_err(|err| TaskwireError::MalformedRequest(err.to_string()))?;
        request.headers_mut().insert(RANGE, range);
        if let Some(validator) = self.validator() {
            let value = HeaderValue::from_str(validator)
                .map_err(|err| TaskwireError::MalformedRequest(err.to_string()))?;
            request.headers_mut().insert(IF_RANGE, value);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResumeData {
        ResumeData {
            url: Url::parse("https://example.com/file.bin").unwrap(),
            temp_path: PathBuf::from("/tmp/taskwire-partial.tmp"),
            offset: 1024,
            etag: Some("\"abc\"".to_string()),
            last_modified: None,
        }
    }

    #[test]
    fn test_blob_roundtrip() {
        let data = sample();
        let blob = data.to_bytes().unwrap();
        assert_eq!(ResumeData::from_bytes(&blob).unwrap(), data);
    }

    #[test]
    fn test_ranged_request() {
        let request = sample().request().unwrap();
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.headers().get(RANGE).unwrap(), "bytes=1024-");
        assert_eq!(request.headers().get(IF_RANGE).unwrap(), "\"abc\"");
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = ResumeData::from_bytes(b"not json").unwrap_err();
        assert!(matches!(err, TaskwireError::MalformedRequest(_)));
    }
}
