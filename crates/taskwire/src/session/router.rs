/*
[INPUT]:  Transport callbacks keyed by task id
[OUTPUT]: Events forwarded to the registered delegate, safe defaults otherwise
[POS]:    Session layer - event router and task registry
[UPDATE]: When adding callback kinds to the transport seam
*/

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tracing::{debug, trace};

use super::delegate::TaskDelegate;
use crate::error::TaskwireError;
use crate::sync::{read, write};
use crate::transport::{SessionEvents, TaskId, UploadStream};
use crate::types::{
    AuthChallenge, CachedResponse, ChallengeDisposition, Credential, RequestHead,
    ResponseDisposition, ResponseHead,
};

/// Sole receiver of transport callbacks; owns the id → delegate registry
#[derive(Default)]
pub struct SessionEventRouter {
    registry: RwLock<HashMap<TaskId, Arc<TaskDelegate>>>,
}

impl SessionEventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, delegate: Arc<TaskDelegate>) {
        let id = delegate.id();
        let kind = delegate.kind();
        write(&self.registry).insert(id, delegate);
        debug!(task_id = id, kind = kind.as_str(), "task registered");
    }

    pub fn evict(&self, task: TaskId) -> Option<Arc<TaskDelegate>> {
        let evicted = write(&self.registry).remove(&task);
        if evicted.is_some() {
            debug!(task_id = task, "task evicted");
        }
        evicted
    }

    /// Registered delegate for `task`; the registry lock is released on return
    pub fn delegate(&self, task: TaskId) -> Option<Arc<TaskDelegate>> {
        read(&self.registry).get(&task).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.registry).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.registry).is_empty()
    }

    fn routed(&self, task: TaskId, event: &'static str) -> Option<Arc<TaskDelegate>> {
        let delegate = self.delegate(task);
        if delegate.is_none() {
            trace!(task_id = task, event, "unrouted event");
        }
        delegate
    }
}

impl SessionEvents for SessionEventRouter {
    fn did_receive_response(&self, task: TaskId, response: &ResponseHead) -> ResponseDisposition {
        match self.routed(task, "response") {
            Some(delegate) => delegate.did_receive_response(response),
            None => ResponseDisposition::Allow,
        }
    }

    fn did_receive_data(&self, task: TaskId, data: &Bytes) {
        if let Some(delegate) = self.routed(task, "data") {
            delegate.did_receive_data(data);
        }
    }

    fn did_become_download(&self, task: TaskId, download_task: TaskId) {
        let delegate = {
            let mut registry = write(&self.registry);
            let Some(delegate) = registry.remove(&task) else {
                trace!(task_id = task, event = "become_download", "unrouted event");
                return;
            };
            delegate.rekey(download_task);
            registry.insert(download_task, Arc::clone(&delegate));
            delegate
        };
        debug!(task_id = task, download_task, "task re-registered as download");
        delegate.did_become_download(download_task);
    }

    fn will_cache_response(&self, task: TaskId, proposed: CachedResponse) -> Option<CachedResponse> {
        match self.routed(task, "will_cache") {
            Some(delegate) => delegate.will_cache_response(proposed),
            None => Some(proposed),
        }
    }

    fn will_perform_redirect(
        &self,
        task: TaskId,
        response: &ResponseHead,
        proposed: RequestHead,
    ) -> Option<RequestHead> {
        match self.routed(task, "redirect") {
            Some(delegate) => delegate.will_perform_redirect(response, proposed),
            None => Some(proposed),
        }
    }

    fn need_new_body_stream(&self, task: TaskId) -> Option<UploadStream> {
        self.routed(task, "body_stream")
            .and_then(|delegate| delegate.need_new_body_stream())
    }

    fn did_send_body_data(
        &self,
        task: TaskId,
        bytes_sent: u64,
        total_bytes_sent: u64,
        total_bytes_expected: Option<u64>,
    ) {
        if let Some(delegate) = self.routed(task, "body_sent") {
            delegate.did_send_body_data(bytes_sent, total_bytes_sent, total_bytes_expected);
        }
    }

    fn did_resume_at_offset(&self, task: TaskId, offset: u64, total_bytes_expected: Option<u64>) {
        if let Some(delegate) = self.routed(task, "resume_at_offset") {
            delegate.did_resume_at_offset(offset, total_bytes_expected);
        }
    }

    fn did_finish_downloading(&self, task: TaskId, location: &Path) {
        if let Some(delegate) = self.routed(task, "finish_downloading") {
            delegate.did_finish_downloading(location);
        }
    }

    fn did_write_data(
        &self,
        task: TaskId,
        bytes_written: u64,
        total_bytes_written: u64,
        total_bytes_expected: Option<u64>,
    ) {
        if let Some(delegate) = self.routed(task, "write_data") {
            delegate.did_write_data(bytes_written, total_bytes_written, total_bytes_expected);
        }
    }

    fn did_receive_challenge(
        &self,
        task: TaskId,
        challenge: &AuthChallenge,
    ) -> (ChallengeDisposition, Option<Credential>) {
        match self.routed(task, "challenge") {
            Some(delegate) => delegate.did_receive_challenge(challenge),
            None => (ChallengeDisposition::PerformDefaultHandling, None),
        }
    }

    /// The delegate records the outcome before it leaves the registry
    fn did_complete(&self, task: TaskId, error: Option<TaskwireError>) {
        if let Some(delegate) = self.routed(task, "complete") {
            delegate.complete(error);
            self.evict(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::credentials::CredentialStore;
    use crate::session::delegate::{DelegateKind, TaskState};
    use crate::types::TaskKind;

    fn register(router: &SessionEventRouter, id: TaskId) -> Arc<TaskDelegate> {
        let delegate = Arc::new(TaskDelegate::new(
            id,
            DelegateKind::data(),
            None,
            Arc::new(CredentialStore::new()),
            None,
        ));
        router.register(Arc::clone(&delegate));
        delegate
    }

    #[test]
    fn test_unregistered_events_use_defaults() {
        let router = SessionEventRouter::new();
        router.did_receive_data(42, &Bytes::from_static(b"x"));
        router.did_complete(42, None);

        let proposed = RequestHead::new(
            reqwest::Method::GET,
            url::Url::parse("https://example.com/next").unwrap(),
        );
        let response = ResponseHead::new(
            url::Url::parse("https://example.com").unwrap(),
            reqwest::StatusCode::FOUND,
            Default::default(),
        );
        assert_eq!(
            router.will_perform_redirect(42, &response, proposed.clone()),
            Some(proposed)
        );
        assert_eq!(
            router.did_receive_response(42, &response),
            ResponseDisposition::Allow
        );
        assert!(router.need_new_body_stream(42).is_none());
        assert!(router.is_empty());
    }

    #[test]
    fn test_complete_records_then_evicts() {
        let router = SessionEventRouter::new();
        let delegate = register(&router, 1);
        router.did_receive_data(1, &Bytes::from_static(b"abc"));
        router.did_complete(1, Some(TaskwireError::Transport("reset".to_string())));

        assert!(router.delegate(1).is_none());
        assert_eq!(delegate.state(), TaskState::Completed);
        assert!(delegate.error().is_some());
        assert_eq!(delegate.data().unwrap().as_ref(), b"abc");

        // late event after eviction
        router.did_receive_data(1, &Bytes::from_static(b"def"));
        assert_eq!(delegate.data().unwrap().as_ref(), b"abc");
    }

    #[test]
    fn test_become_download_rekeys_delegate() {
        let router = SessionEventRouter::new();
        let delegate = register(&router, 3);
        router.did_become_download(3, 4);

        assert!(router.delegate(3).is_none());
        assert!(Arc::ptr_eq(&router.delegate(4).unwrap(), &delegate));
        assert_eq!(delegate.id(), 4);
        assert_eq!(delegate.kind(), TaskKind::Download);
    }
}
