/*
[INPUT]:  Caller closures registered on a task
[OUTPUT]: Optional per-task hook table consulted by the delegate
[POS]:    Session layer - override handlers
[UPDATE]: When adding a hook kind
*/

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::transport::{TaskId, UploadStream};
use crate::types::{
    AuthChallenge, CachedResponse, ChallengeDisposition, Credential, RequestHead,
    ResponseDisposition, ResponseHead,
};

/// Replaces or refuses (`None`) the proposed redirect request
pub type RedirectHandler =
    Arc<dyn Fn(&ResponseHead, RequestHead) -> Option<RequestHead> + Send + Sync>;

pub type ChallengeHandler =
    Arc<dyn Fn(&AuthChallenge) -> (ChallengeDisposition, Option<Credential>) + Send + Sync>;

/// Produces a fresh body stream when an upload has to be resent
pub type BodyStreamHandler = Arc<dyn Fn() -> Option<UploadStream> + Send + Sync>;

pub type DispositionHandler = Arc<dyn Fn(&ResponseHead) -> ResponseDisposition + Send + Sync>;

/// Told the new download task id; may supply the destination for the file
pub type BecomeDownloadHandler = Arc<dyn Fn(TaskId) -> Option<DestinationResolver> + Send + Sync>;

pub type StreamHandler = Arc<dyn Fn(&Bytes) + Send + Sync>;

pub type CacheHandler = Arc<dyn Fn(CachedResponse) -> Option<CachedResponse> + Send + Sync>;

/// `(chunk_bytes, total_completed, total_expected)`
pub type ProgressHandler = Arc<dyn Fn(u64, u64, Option<u64>) + Send + Sync>;

/// Maps (temporary location, response) to the final download location
pub type DestinationResolver =
    Arc<dyn Fn(&Path, Option<&ResponseHead>) -> PathBuf + Send + Sync>;

/// Hook slots of one task, each independently settable
#[derive(Clone, Default)]
pub struct TaskHandlers {
    pub redirect: Option<RedirectHandler>,
    pub challenge: Option<ChallengeHandler>,
    pub new_body_stream: Option<BodyStreamHandler>,
    pub response_disposition: Option<DispositionHandler>,
    pub become_download: Option<BecomeDownloadHandler>,
    pub stream: Option<StreamHandler>,
    pub will_cache: Option<CacheHandler>,
    pub progress: Option<ProgressHandler>,
}

impl fmt::Debug for TaskHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandlers")
            .field("redirect", &self.redirect.is_some())
            .field("challenge", &self.challenge.is_some())
            .field("new_body_stream", &self.new_body_stream.is_some())
            .field("response_disposition", &self.response_disposition.is_some())
            .field("become_download", &self.become_download.is_some())
            .field("stream", &self.stream.is_some())
            .field("will_cache", &self.will_cache.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
