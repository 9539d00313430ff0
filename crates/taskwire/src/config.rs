/*
[INPUT]:  YAML configuration file or defaults
[OUTPUT]: Session configuration (base URL, headers, transport timeouts, task defaults)
[POS]:    Configuration layer - opaque transport configuration handed to the manager
[UPDATE]: When adding configuration options
*/

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, TaskwireError};

/// Session-wide configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Base URL that relative task URLs are joined onto
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Headers added to every request that does not set them itself
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
    /// User-Agent header; defaults to `taskwire/<version>`
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Whole-request timeout enforced by the transport
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Connect timeout enforced by the transport
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Maximum redirects the transport offers before failing
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
    /// Resume tasks as soon as they are registered
    #[serde(default = "default_true")]
    pub start_requests_immediately: bool,
    /// Offer completed responses to the cache hook
    #[serde(default)]
    pub cache_responses: bool,
    /// Directory for in-flight download files; system temp dir when unset
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_headers: BTreeMap::new(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_redirects: default_max_redirects(),
            start_requests_immediately: true,
            cache_responses: false,
            download_dir: None,
        }
    }
}

fn default_user_agent() -> String {
    format!("taskwire/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_redirects() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

impl SessionConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Default header map: Accept-Language, User-Agent, then configured headers
    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en;q=1.0"));
        let user_agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|err| TaskwireError::Config(format!("invalid user agent: {err}")))?;
        headers.insert(USER_AGENT, user_agent);

        for (name, value) in &self.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| TaskwireError::Config(format!("invalid header name {name}: {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| TaskwireError::Config(format!("invalid header value: {err}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(config.start_requests_immediately);
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.user_agent.starts_with("taskwire/"));
    }

    #[test]
    fn test_yaml_partial_uses_defaults() {
        let config = SessionConfig::from_yaml_str(
            r#"
base_url: "https://api.example.com/v1/"
default_headers:
  x-client: demo
start_requests_immediately: false
cache_responses: true
"#,
        )
        .unwrap();

        assert_eq!(
            config.base_url.as_ref().map(Url::as_str),
            Some("https://api.example.com/v1/")
        );
        assert!(!config.start_requests_immediately);
        assert!(config.cache_responses);
        assert_eq!(config.connect_timeout_secs, 10);

        let headers = config.header_map().unwrap();
        assert_eq!(headers.get("x-client").unwrap(), "demo");
        assert_eq!(headers.get(ACCEPT_LANGUAGE).unwrap(), "en;q=1.0");
    }

    #[test]
    fn test_invalid_header_is_config_error() {
        let mut config = SessionConfig::default();
        config
            .default_headers
            .insert("bad header".to_string(), "x".to_string());
        let err = config.header_map().unwrap_err();
        assert!(matches!(err, TaskwireError::Config(_)));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = SessionConfig::from_yaml_str("max_redirects: [1, 2]").unwrap_err();
        assert!(matches!(err, TaskwireError::Yaml(_)));
    }
}
