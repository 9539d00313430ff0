/*
[INPUT]:  Delegate, transport and router of a submitted task
[OUTPUT]: Caller-facing handle: lifecycle control, hooks, state, completion callbacks
[POS]:    Session layer - task handle
[UPDATE]: When exposing new task controls or hooks
*/

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::oneshot;
use tracing::debug;

use super::delegate::{ProgressSnapshot, TaskDelegate, TaskState};
use super::handlers::DestinationResolver;
use super::router::SessionEventRouter;
use crate::error::{Result, TaskwireError};
use crate::response::{TaskResponse, Transform};
use crate::timeline::Timeline;
use crate::transport::{TaskId, Transport, UploadStream};
use crate::types::{
    AuthChallenge, CachedResponse, ChallengeDisposition, Credential, RequestHead,
    ResponseDisposition, ResponseHead, TaskKind,
};

/// Handle to one submitted task.
///
/// Setters take `&self` and return `&Self`; each writes its own slot, so the
/// order they are called in does not matter.
#[derive(Clone)]
pub struct NetworkTask {
    delegate: Arc<TaskDelegate>,
    transport: Arc<dyn Transport>,
    router: Arc<SessionEventRouter>,
}

impl NetworkTask {
    pub(crate) fn new(
        delegate: Arc<TaskDelegate>,
        transport: Arc<dyn Transport>,
        router: Arc<SessionEventRouter>,
    ) -> Self {
        Self {
            delegate,
            transport,
            router,
        }
    }

    pub fn id(&self) -> TaskId {
        self.delegate.id()
    }

    pub fn kind(&self) -> TaskKind {
        self.delegate.kind()
    }

    pub fn state(&self) -> TaskState {
        self.delegate.state()
    }

    pub fn delegate(&self) -> &Arc<TaskDelegate> {
        &self.delegate
    }

    // Lifecycle

    pub fn resume(&self) -> &Self {
        if self.delegate.mark_resumed() {
            self.transport.resume(self.id());
        }
        self
    }

    pub fn suspend(&self) -> &Self {
        if self.delegate.mark_suspended() {
            debug!(task_id = self.id(), "task suspended");
            self.transport.suspend(self.id());
        }
        self
    }

    /// Plain, data and upload tasks complete as cancelled right away.
    /// Downloads complete once the transport has tried to capture resume data.
    pub fn cancel(&self) -> &Self {
        if self.delegate.is_completed() {
            return self;
        }
        let id = self.id();
        match self.kind() {
            TaskKind::Download => {
                debug!(task_id = id, "cancelling download, capturing resume data");
                self.transport.cancel_producing_resume_data(id);
            }
            TaskKind::Plain | TaskKind::Data | TaskKind::Upload => {
                self.transport.cancel(id);
                if self.delegate.complete(Some(TaskwireError::cancelled())) {
                    self.router.evict(id);
                }
            }
        }
        self
    }

    // Credentials and hooks

    pub fn authenticate(&self, user: impl Into<String>, password: impl Into<String>) -> &Self {
        self.delegate
            .set_credential(Credential::user_password(user, password));
        self
    }

    pub fn authenticate_with(&self, credential: Credential) -> &Self {
        self.delegate.set_credential(credential);
        self
    }

    pub fn credential(&self) -> Option<Credential> {
        self.delegate.credential()
    }

    /// `(chunk_bytes, total_completed, total_expected)` of the task's main metric
    pub fn on_progress<F>(&self, handler: F) -> &Self
    where
        F: Fn(u64, u64, Option<u64>) + Send + Sync + 'static,
    {
        self.delegate
            .update_handlers(|handlers| handlers.progress = Some(Arc::new(handler)));
        self
    }

    /// Receive body chunks instead of buffering them
    pub fn stream<F>(&self, handler: F) -> &Self
    where
        F: Fn(&Bytes) + Send + Sync + 'static,
    {
        self.delegate
            .update_handlers(|handlers| handlers.stream = Some(Arc::new(handler)));
        self
    }

    pub fn on_redirect<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ResponseHead, RequestHead) -> Option<RequestHead> + Send + Sync + 'static,
    {
        self.delegate
            .update_handlers(|handlers| handlers.redirect = Some(Arc::new(handler)));
        self
    }

    pub fn on_challenge<F>(&self, handler: F) -> &Self
    where
        F: Fn(&AuthChallenge) -> (ChallengeDisposition, Option<Credential>) + Send + Sync + 'static,
    {
        self.delegate
            .update_handlers(|handlers| handlers.challenge = Some(Arc::new(handler)));
        self
    }

    pub fn on_response_disposition<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ResponseHead) -> ResponseDisposition + Send + Sync + 'static,
    {
        self.delegate.update_handlers(|handlers| {
            handlers.response_disposition = Some(Arc::new(handler))
        });
        self
    }

    /// Called with the new download id; the returned resolver places the file
    pub fn on_become_download<F>(&self, handler: F) -> &Self
    where
        F: Fn(TaskId) -> Option<DestinationResolver> + Send + Sync + 'static,
    {
        self.delegate
            .update_handlers(|handlers| handlers.become_download = Some(Arc::new(handler)));
        self
    }

    pub fn on_will_cache<F>(&self, handler: F) -> &Self
    where
        F: Fn(CachedResponse) -> Option<CachedResponse> + Send + Sync + 'static,
    {
        self.delegate
            .update_handlers(|handlers| handlers.will_cache = Some(Arc::new(handler)));
        self
    }

    pub fn on_new_body_stream<F>(&self, handler: F) -> &Self
    where
        F: Fn() -> Option<UploadStream> + Send + Sync + 'static,
    {
        self.delegate
            .update_handlers(|handlers| handlers.new_body_stream = Some(Arc::new(handler)));
        self
    }

    // State

    pub fn progress(&self) -> ProgressSnapshot {
        self.delegate.progress()
    }

    pub fn upload_progress(&self) -> ProgressSnapshot {
        self.delegate.upload_progress()
    }

    pub fn data(&self) -> Option<Bytes> {
        self.delegate.data()
    }

    pub fn request_head(&self) -> Option<RequestHead> {
        self.delegate.request()
    }

    pub fn response_head(&self) -> Option<ResponseHead> {
        self.delegate.response()
    }

    pub fn error(&self) -> Option<Arc<TaskwireError>> {
        self.delegate.error()
    }

    pub fn resume_data(&self) -> Option<Bytes> {
        self.delegate.resume_data()
    }

    pub fn destination(&self) -> Option<PathBuf> {
        self.delegate.destination()
    }

    pub fn timeline(&self) -> Timeline {
        self.delegate.timeline()
    }

    // Completion

    /// Run `transform` once the task is terminal and hand the result to
    /// `callback`. Callbacks run in registration order, off the transport.
    pub fn response<T, F>(&self, transform: Transform<T>, callback: F) -> &Self
    where
        T: Send + 'static,
        F: FnOnce(TaskResponse<T>) + Send + 'static,
    {
        let delegate = Arc::clone(&self.delegate);
        self.delegate.enqueue(Box::new(move || {
            callback(transformed(&delegate, &transform));
        }));
        self
    }

    /// Future form of [`NetworkTask::response`]
    pub async fn response_async<T>(&self, transform: Transform<T>) -> Result<TaskResponse<T>>
    where
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.response(transform, move |response| {
            let _ = sender.send(response);
        });
        receiver
            .await
            .map_err(|_| TaskwireError::Transport("completion callback dropped".to_string()))
    }

    /// Resolves once the task reached its terminal state
    pub async fn finished(&self) -> &Self {
        let mut finished = self.delegate.subscribe_finished();
        let _ = finished.wait_for(|done| *done).await;
        self
    }
}

fn transformed<T>(delegate: &TaskDelegate, transform: &Transform<T>) -> TaskResponse<T> {
    let completion = delegate.completion();
    let (value, transform_error) =
        transform.apply(completion.response.as_ref(), completion.data.as_ref());
    let mut timeline = completion.timeline;
    timeline.transform_completed = Some(Utc::now());

    TaskResponse {
        task_id: completion.task_id,
        request: completion.request,
        response: completion.response,
        data: completion.data,
        destination: completion.destination,
        resume_data: completion.resume_data,
        value,
        error: completion.error,
        transform_error,
        timeline,
    }
}
