/*
[INPUT]:  Error sources (request construction, encoding, transport, decoding, filesystem)
[OUTPUT]: Structured error type with taxonomy classification
[POS]:    Error handling layer - unified error type for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use std::path::PathBuf;

use bytes::Bytes;
use thiserror::Error;

/// Main error type for taskwire
#[derive(Error, Debug)]
pub enum TaskwireError {
    /// The URL or request could not be turned into a task
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Parameters could not be encoded into the request
    #[error("Parameter encoding failed: {0}")]
    Encoding(String),

    /// HTTP request failed inside the transport
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport reported a failure without an underlying HTTP error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Redirect chain exceeded the configured limit
    #[error("Too many redirects (limit {limit})")]
    TooManyRedirects { limit: u32 },

    /// Task was cancelled; downloads may carry resumable state
    #[error("Task cancelled")]
    Cancelled { resume_data: Option<Bytes> },

    /// JSON decoding of the response body failed
    #[error("JSON decoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Property list decoding of the response body failed
    #[error("Property list decoding failed: {0}")]
    PropertyList(#[from] plist::Error),

    /// Response body is not valid text in the given charset
    #[error("Response body could not be decoded as {charset}")]
    StringDecoding { charset: String },

    /// Response carried no body but the transform requires one
    #[error("Response body was empty")]
    EmptyResponse,

    /// Moving a finished download to its destination failed
    #[error("Failed to move download from {} to {}: {source}", from.display(), to.display())]
    FileMove {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML configuration could not be parsed
    #[error("Configuration parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Failure category a [`TaskwireError`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request could not be built; no task was created
    Construction,
    /// Parameters were not encoded; the task still ran
    Encoding,
    /// The transport failed the task
    Transport,
    /// Completed bytes could not be decoded
    Transform,
    /// Download file could not be moved or written
    Filesystem,
    /// Task was cancelled by the caller or a hook
    Cancelled,
    /// Session configuration is invalid
    Configuration,
}

impl TaskwireError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskwireError::MalformedRequest(_) | TaskwireError::UrlParse(_) => {
                ErrorKind::Construction
            }
            TaskwireError::Encoding(_) => ErrorKind::Encoding,
            TaskwireError::Http(_)
            | TaskwireError::Transport(_)
            | TaskwireError::TooManyRedirects { .. } => ErrorKind::Transport,
            TaskwireError::Cancelled { .. } => ErrorKind::Cancelled,
            TaskwireError::Json(_)
            | TaskwireError::PropertyList(_)
            | TaskwireError::StringDecoding { .. }
            | TaskwireError::EmptyResponse => ErrorKind::Transform,
            TaskwireError::FileMove { .. } | TaskwireError::Io(_) => ErrorKind::Filesystem,
            TaskwireError::Config(_) | TaskwireError::Yaml(_) => ErrorKind::Configuration,
        }
    }

    /// Check if the error comes from cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskwireError::Cancelled { .. })
    }

    /// Check if the error comes from parameter encoding
    pub fn is_encoding_error(&self) -> bool {
        matches!(self, TaskwireError::Encoding(_))
    }

    /// Resume data captured when a download was cancelled
    pub fn resume_data(&self) -> Option<&Bytes> {
        match self {
            TaskwireError::Cancelled { resume_data } => resume_data.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn cancelled() -> Self {
        TaskwireError::Cancelled { resume_data: None }
    }
}

/// Result type alias for taskwire operations
pub type Result<T> = std::result::Result<T, TaskwireError>;
