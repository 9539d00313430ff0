/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public taskwire crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod config;
pub mod encoding;
pub mod error;
pub mod response;
pub mod session;
mod sync;
pub mod timeline;
pub mod transport;
pub mod types;

pub use config::SessionConfig;

pub use error::{ErrorKind, Result, TaskwireError};

// Re-export commonly used types from encoding
pub use encoding::{CustomEncoder, ParameterEncoding, PropertyListOptions};

// Re-export commonly used types from response
pub use response::{Charset, JsonOptions, TaskResponse, Transform};

// Re-export commonly used types from session
pub use session::{
    CredentialStore,
    NetworkTask,
    ProgressSnapshot,
    SessionEventRouter,
    SessionManager,
    TaskState,
};

pub use timeline::Timeline;

// Re-export commonly used types from transport
pub use transport::{
    HttpTransport,
    ResumeData,
    SessionEvents,
    TaskId,
    TaskSource,
    Transport,
    UploadSource,
    UploadStream,
};

// Re-export all types
pub use types::*;
