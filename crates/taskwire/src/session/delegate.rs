/*
[INPUT]:  Routed transport events for one task, caller hooks, completion callbacks
[OUTPUT]: Per-task state (lifecycle, bytes, progress, terminal error, download location)
[POS]:    Session layer - task delegate state machine
[UPDATE]: When adding task kinds or changing how an event mutates task state
*/

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::credentials::CredentialStore;
use super::handlers::{DestinationResolver, TaskHandlers};
use super::queue::{CompletionQueue, Job};
use crate::error::TaskwireError;
use crate::timeline::Timeline;
use crate::transport::{TaskId, UploadStream};
use crate::sync::{lock, read, write};
use crate::types::{
    AuthChallenge, AuthenticationMethod, CachedResponse, ChallengeDisposition, Credential,
    RequestHead, ResponseDisposition, ResponseHead, TaskKind,
};

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskState {
    Created,
    Running { suspended: bool },
    Completed,
}

/// Point-in-time view of one progress metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub total: Option<u64>,
}

impl ProgressSnapshot {
    /// Completed fraction in `0.0..=1.0`, when the total is known
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.completed as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

const UNKNOWN_TOTAL: u64 = u64::MAX;

#[derive(Debug)]
struct ProgressCounter {
    completed: AtomicU64,
    total: AtomicU64,
}

impl ProgressCounter {
    fn new() -> Self {
        Self {
            completed: AtomicU64::new(0),
            total: AtomicU64::new(UNKNOWN_TOTAL),
        }
    }

    fn set_total(&self, total: Option<u64>) {
        self.total
            .store(total.unwrap_or(UNKNOWN_TOTAL), Ordering::Release);
    }

    fn add(&self, bytes: u64) -> u64 {
        self.completed.fetch_add(bytes, Ordering::AcqRel) + bytes
    }

    fn set(&self, completed: u64, total: Option<u64>) {
        self.completed.fetch_max(completed, Ordering::AcqRel);
        self.set_total(total);
    }

    fn reset(&self) {
        self.completed.store(0, Ordering::Release);
        self.total.store(UNKNOWN_TOTAL, Ordering::Release);
    }

    fn total(&self) -> Option<u64> {
        match self.total.load(Ordering::Acquire) {
            UNKNOWN_TOTAL => None,
            total => Some(total),
        }
    }

    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed.load(Ordering::Acquire),
            total: self.total(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct DataState {
    buffer: BytesMut,
}

pub(crate) struct DownloadState {
    resolver: Option<DestinationResolver>,
    destination: Option<PathBuf>,
    resume_data: Option<Bytes>,
}

impl DownloadState {
    pub(crate) fn new(resolver: Option<DestinationResolver>) -> Self {
        Self {
            resolver,
            destination: None,
            resume_data: None,
        }
    }
}

/// Per-kind state; capabilities are decided by matching on it
pub(crate) enum DelegateKind {
    Plain,
    Data(DataState),
    Download(DownloadState),
    Upload(DataState),
}

impl DelegateKind {
    pub(crate) fn data() -> Self {
        DelegateKind::Data(DataState::default())
    }

    pub(crate) fn upload() -> Self {
        DelegateKind::Upload(DataState::default())
    }

    pub(crate) fn download(resolver: DestinationResolver) -> Self {
        DelegateKind::Download(DownloadState::new(Some(resolver)))
    }

    fn task_kind(&self) -> TaskKind {
        match self {
            DelegateKind::Plain => TaskKind::Plain,
            DelegateKind::Data(_) => TaskKind::Data,
            DelegateKind::Download(_) => TaskKind::Download,
            DelegateKind::Upload(_) => TaskKind::Upload,
        }
    }

    fn buffer(&self) -> Option<&BytesMut> {
        match self {
            DelegateKind::Data(state) | DelegateKind::Upload(state) => Some(&state.buffer),
            _ => None,
        }
    }
}

struct DelegateInner {
    state: TaskState,
    kind: DelegateKind,
    request: Option<RequestHead>,
    response: Option<ResponseHead>,
    error: Option<Arc<TaskwireError>>,
    credential: Option<Credential>,
    timeline: Timeline,
}

/// Everything a response callback gets to see once the task is terminal
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    pub task_id: TaskId,
    pub request: Option<RequestHead>,
    pub response: Option<ResponseHead>,
    pub data: Option<Bytes>,
    pub destination: Option<PathBuf>,
    pub resume_data: Option<Bytes>,
    pub error: Option<Arc<TaskwireError>>,
    pub timeline: Timeline,
}

/// Mutable state container and event handler of one task
pub struct TaskDelegate {
    id: AtomicU64,
    inner: Mutex<DelegateInner>,
    progress: ProgressCounter,
    upload_progress: ProgressCounter,
    handlers: RwLock<TaskHandlers>,
    credentials: Arc<CredentialStore>,
    queue: CompletionQueue,
    finished: watch::Sender<bool>,
}

impl TaskDelegate {
    pub(crate) fn new(
        id: TaskId,
        kind: DelegateKind,
        request: Option<RequestHead>,
        credentials: Arc<CredentialStore>,
        initial_error: Option<TaskwireError>,
    ) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            id: AtomicU64::new(id),
            inner: Mutex::new(DelegateInner {
                state: TaskState::Created,
                kind,
                request,
                response: None,
                error: initial_error.map(Arc::new),
                credential: None,
                timeline: Timeline::default(),
            }),
            progress: ProgressCounter::new(),
            upload_progress: ProgressCounter::new(),
            handlers: RwLock::new(TaskHandlers::default()),
            credentials,
            queue: CompletionQueue::new(),
            finished,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id.load(Ordering::Acquire)
    }

    pub fn kind(&self) -> TaskKind {
        lock(&self.inner).kind.task_kind()
    }

    pub fn state(&self) -> TaskState {
        lock(&self.inner).state
    }

    pub fn is_completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    pub(crate) fn rekey(&self, id: TaskId) {
        self.id.store(id, Ordering::Release);
    }

    // Lifecycle

    /// Returns whether the transport should be resumed
    pub(crate) fn mark_resumed(&self) -> bool {
        let mut inner = lock(&self.inner);
        match inner.state {
            TaskState::Created => {
                inner.state = TaskState::Running { suspended: false };
                inner.timeline.start = Some(Utc::now());
                debug!(task_id = self.id(), "task started");
                true
            }
            TaskState::Running { suspended: true } => {
                inner.state = TaskState::Running { suspended: false };
                true
            }
            TaskState::Running { suspended: false } | TaskState::Completed => false,
        }
    }

    /// Returns whether the transport should be suspended
    pub(crate) fn mark_suspended(&self) -> bool {
        let mut inner = lock(&self.inner);
        match inner.state {
            TaskState::Running { suspended: false } => {
                inner.state = TaskState::Running { suspended: true };
                true
            }
            _ => false,
        }
    }

    /// Move to the terminal state exactly once.
    ///
    /// A transport error replaces any earlier (encoding) error; a missing one
    /// keeps it. Queued completion callbacks are released afterwards.
    pub(crate) fn complete(&self, error: Option<TaskwireError>) -> bool {
        {
            let mut inner = lock(&self.inner);
            if inner.state == TaskState::Completed {
                return false;
            }
            inner.state = TaskState::Completed;
            inner.timeline.completed = Some(Utc::now());

            if let Some(error) = error {
                if let (DelegateKind::Download(download), Some(blob)) =
                    (&mut inner.kind, error.resume_data())
                {
                    download.resume_data = Some(blob.clone());
                }
                inner.error = Some(Arc::new(error));
            }

            match &inner.error {
                Some(error) if error.is_cancelled() => {
                    info!(task_id = self.id(), "task cancelled")
                }
                Some(error) => debug!(task_id = self.id(), error = %error, "task completed with error"),
                None => debug!(task_id = self.id(), "task completed"),
            }
        }

        self.finished.send_replace(true);
        self.queue.release();
        true
    }

    // Event handling

    pub(crate) fn did_receive_response(&self, response: &ResponseHead) -> ResponseDisposition {
        let consults_handler = {
            let mut inner = lock(&self.inner);
            if inner.state == TaskState::Completed {
                return ResponseDisposition::Allow;
            }
            inner.response = Some(response.clone());
            inner.timeline.initial_response.get_or_insert_with(Utc::now);
            match inner.kind {
                DelegateKind::Data(_) | DelegateKind::Upload(_) => {
                    self.progress.set_total(response.expected_content_length());
                    true
                }
                DelegateKind::Plain | DelegateKind::Download(_) => false,
            }
        };

        if !consults_handler {
            return ResponseDisposition::Allow;
        }
        let handler = read(&self.handlers).response_disposition.clone();
        match handler {
            Some(handler) => handler(response),
            None => ResponseDisposition::Allow,
        }
    }

    pub(crate) fn did_receive_data(&self, data: &Bytes) {
        let stream = read(&self.handlers).stream.clone();
        {
            let mut inner = lock(&self.inner);
            if inner.state == TaskState::Completed {
                return;
            }
            match &mut inner.kind {
                DelegateKind::Data(state) | DelegateKind::Upload(state) => {
                    if stream.is_none() {
                        state.buffer.extend_from_slice(data);
                    }
                }
                DelegateKind::Plain | DelegateKind::Download(_) => return,
            }
        }

        let chunk = data.len() as u64;
        let completed = self.progress.add(chunk);
        if let Some(stream) = stream {
            stream(data);
        }
        self.report_progress(chunk, completed, self.progress.total());
    }

    /// The data task continues as a download under `download_task`
    pub(crate) fn did_become_download(&self, download_task: TaskId) {
        let handler = read(&self.handlers).become_download.clone();
        let resolver = handler.and_then(|handler| handler(download_task));
        {
            let mut inner = lock(&self.inner);
            inner.kind = DelegateKind::Download(DownloadState::new(resolver));
        }
        self.progress.reset();
        info!(task_id = download_task, "delegate now tracks a download");
    }

    pub(crate) fn will_cache_response(&self, proposed: CachedResponse) -> Option<CachedResponse> {
        let handler = read(&self.handlers).will_cache.clone();
        match handler {
            Some(handler) => handler(proposed),
            None => Some(proposed),
        }
    }

    pub(crate) fn will_perform_redirect(
        &self,
        response: &ResponseHead,
        proposed: RequestHead,
    ) -> Option<RequestHead> {
        let handler = read(&self.handlers).redirect.clone();
        let next = match handler {
            Some(handler) => handler(response, proposed),
            None => Some(proposed),
        };
        if let Some(next) = &next {
            lock(&self.inner).request = Some(next.clone());
        }
        next
    }

    pub(crate) fn need_new_body_stream(&self) -> Option<UploadStream> {
        let handler = read(&self.handlers).new_body_stream.clone();
        handler.and_then(|handler| handler())
    }

    pub(crate) fn did_send_body_data(&self, bytes_sent: u64, total_sent: u64, expected: Option<u64>) {
        self.upload_progress.set(total_sent, expected);
        if self.kind() == TaskKind::Upload {
            self.report_progress(bytes_sent, total_sent, expected);
        }
    }

    pub(crate) fn did_resume_at_offset(&self, offset: u64, expected: Option<u64>) {
        self.progress.set(offset, expected);
    }

    pub(crate) fn did_write_data(&self, bytes_written: u64, total_written: u64, expected: Option<u64>) {
        if self.is_completed() {
            return;
        }
        self.progress.set(total_written, expected);
        self.report_progress(bytes_written, total_written, expected);
    }

    /// Resolve the destination and move the finished file there. Without a
    /// resolver the file is kept next to the temporary one. A move failure
    /// becomes the terminal error unless one is already recorded.
    pub(crate) fn did_finish_downloading(&self, location: &Path) {
        let (resolver, response) = {
            let inner = lock(&self.inner);
            match &inner.kind {
                DelegateKind::Download(download) => {
                    (download.resolver.clone(), inner.response.clone())
                }
                _ => return,
            }
        };
        let destination = match resolver {
            Some(resolver) => resolver(location, response.as_ref()),
            None => {
                debug!(task_id = self.id(), "no destination resolver, keeping file beside temp path");
                kept_path(location)
            }
        };
        let moved = move_file(location, &destination);

        let mut inner = lock(&self.inner);
        match moved {
            Ok(()) => {
                info!(task_id = self.id(), destination = %destination.display(), "download moved");
                if let DelegateKind::Download(download) = &mut inner.kind {
                    download.destination = Some(destination);
                }
            }
            Err(err) => {
                warn!(task_id = self.id(), error = %err, "download move failed");
                if inner.error.is_none() {
                    inner.error = Some(Arc::new(err));
                }
            }
        }
    }

    /// Answer a challenge: caller hook first, then the default policy
    pub(crate) fn did_receive_challenge(
        &self,
        challenge: &AuthChallenge,
    ) -> (ChallengeDisposition, Option<Credential>) {
        let handler = read(&self.handlers).challenge.clone();
        if let Some(handler) = handler {
            return handler(challenge);
        }

        if challenge.previous_failure_count > 0 {
            return (ChallengeDisposition::CancelChallenge, None);
        }
        let stored = lock(&self.inner)
            .credential
            .clone()
            .or_else(|| self.credentials.default_for(&challenge.protection_space));
        if let Some(credential) = stored {
            return (ChallengeDisposition::UseCredential, Some(credential));
        }
        if challenge.protection_space.method == AuthenticationMethod::ServerTrust {
            let trust = Credential::ServerTrust {
                host: challenge.protection_space.host.clone(),
            };
            return (ChallengeDisposition::UseCredential, Some(trust));
        }
        (ChallengeDisposition::PerformDefaultHandling, None)
    }

    fn report_progress(&self, chunk: u64, completed: u64, expected: Option<u64>) {
        let handler = read(&self.handlers).progress.clone();
        if let Some(handler) = handler {
            handler(chunk, completed, expected);
        }
    }

    // Accessors used by the task handle

    pub(crate) fn update_handlers(&self, update: impl FnOnce(&mut TaskHandlers)) {
        update(&mut write(&self.handlers));
    }

    pub(crate) fn set_credential(&self, credential: Credential) {
        lock(&self.inner).credential = Some(credential);
    }

    pub fn credential(&self) -> Option<Credential> {
        lock(&self.inner).credential.clone()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    pub fn upload_progress(&self) -> ProgressSnapshot {
        self.upload_progress.snapshot()
    }

    /// Accumulated body; `None` when nothing was buffered
    pub fn data(&self) -> Option<Bytes> {
        let inner = lock(&self.inner);
        inner
            .kind
            .buffer()
            .filter(|buffer| !buffer.is_empty())
            .map(|buffer| Bytes::copy_from_slice(buffer))
    }

    pub fn request(&self) -> Option<RequestHead> {
        lock(&self.inner).request.clone()
    }

    pub fn response(&self) -> Option<ResponseHead> {
        lock(&self.inner).response.clone()
    }

    pub fn error(&self) -> Option<Arc<TaskwireError>> {
        lock(&self.inner).error.clone()
    }

    pub fn destination(&self) -> Option<PathBuf> {
        match &lock(&self.inner).kind {
            DelegateKind::Download(download) => download.destination.clone(),
            _ => None,
        }
    }

    pub fn resume_data(&self) -> Option<Bytes> {
        match &lock(&self.inner).kind {
            DelegateKind::Download(download) => download.resume_data.clone(),
            _ => None,
        }
    }

    pub fn timeline(&self) -> Timeline {
        lock(&self.inner).timeline
    }

    pub(crate) fn completion(&self) -> Completion {
        let data = self.data();
        let inner = lock(&self.inner);
        let (destination, resume_data) = match &inner.kind {
            DelegateKind::Download(download) => {
                (download.destination.clone(), download.resume_data.clone())
            }
            _ => (None, None),
        };
        Completion {
            task_id: self.id(),
            request: inner.request.clone(),
            response: inner.response.clone(),
            data,
            destination,
            resume_data,
            error: inner.error.clone(),
            timeline: inner.timeline,
        }
    }

    pub(crate) fn enqueue(&self, job: Job) {
        self.queue.push(job);
    }

    pub(crate) fn subscribe_finished(&self) -> watch::Receiver<bool> {
        self.finished.subscribe()
    }
}

/// Where a download without a resolver ends up: the temporary name with a
/// `.download` extension, which the transport leaves in place
fn kept_path(location: &Path) -> PathBuf {
    location.with_extension("download")
}

/// Rename, falling back to copy and remove across filesystems.
/// Missing parent directories are not created.
fn move_file(from: &Path, to: &Path) -> Result<(), TaskwireError> {
    let wrap = |source| TaskwireError::FileMove {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to).map_err(wrap)?;
    std::fs::remove_file(from).map_err(wrap)?;
    Ok(())
}
