/*
[INPUT]:  Prepared requests, upload bodies, resume data
[OUTPUT]: Transport tasks identified by numeric ids, callback stream per task
[POS]:    Transport seam - contract between the session core and a URL-loading backend
[UPDATE]: When adding callback kinds or task control operations
*/

pub mod http;
pub mod resume;

use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use reqwest::Request;

use crate::error::{Result, TaskwireError};
use crate::types::{
    AuthChallenge, CachedResponse, ChallengeDisposition, Credential, RequestHead,
    ResponseDisposition, ResponseHead,
};

pub use http::HttpTransport;
pub use resume::ResumeData;

/// Transport-assigned task identifier, unique per transport
pub type TaskId = u64;

/// Streamed request body
pub type UploadStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

/// Body of an upload task
pub enum UploadSource {
    Bytes(Bytes),
    File(PathBuf),
    Stream(UploadStream),
}

impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            UploadSource::File(path) => f.debug_tuple("File").field(path).finish(),
            UploadSource::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Work handed to the transport
#[derive(Debug)]
pub enum TaskSource {
    Data(Request),
    Upload(Request, UploadSource),
    Download(Request),
    ResumeDownload(ResumeData),
}

/// Every callback a transport delivers for its tasks.
///
/// Events of one task arrive in order (response, data/progress, completion);
/// events of different tasks may interleave. Hooks returning a value are
/// answered synchronously.
pub trait SessionEvents: Send + Sync {
    fn did_receive_response(&self, task: TaskId, response: &ResponseHead) -> ResponseDisposition;

    fn did_receive_data(&self, task: TaskId, data: &Bytes);

    fn did_become_download(&self, task: TaskId, download_task: TaskId);

    fn will_cache_response(&self, task: TaskId, proposed: CachedResponse) -> Option<CachedResponse>;

    fn will_perform_redirect(
        &self,
        task: TaskId,
        response: &ResponseHead,
        proposed: RequestHead,
    ) -> Option<RequestHead>;

    fn need_new_body_stream(&self, task: TaskId) -> Option<UploadStream>;

    fn did_send_body_data(
        &self,
        task: TaskId,
        bytes_sent: u64,
        total_bytes_sent: u64,
        total_bytes_expected: Option<u64>,
    );

    fn did_resume_at_offset(&self, task: TaskId, offset: u64, total_bytes_expected: Option<u64>);

    fn did_finish_downloading(&self, task: TaskId, location: &Path);

    fn did_write_data(
        &self,
        task: TaskId,
        bytes_written: u64,
        total_bytes_written: u64,
        total_bytes_expected: Option<u64>,
    );

    fn did_receive_challenge(
        &self,
        task: TaskId,
        challenge: &AuthChallenge,
    ) -> (ChallengeDisposition, Option<Credential>);

    fn did_complete(&self, task: TaskId, error: Option<TaskwireError>);
}

/// URL-loading backend owning the actual network work.
///
/// Tasks are created suspended; nothing is delivered to `events` before the
/// first `resume`.
pub trait Transport: Send + Sync {
    fn create_task(&self, source: TaskSource, events: Arc<dyn SessionEvents>) -> Result<TaskId>;

    fn resume(&self, task: TaskId);

    fn suspend(&self, task: TaskId);

    fn cancel(&self, task: TaskId);

    /// Cancel a download, completing it with `Cancelled { resume_data }` when
    /// partial state could be captured
    fn cancel_producing_resume_data(&self, task: TaskId);
}
