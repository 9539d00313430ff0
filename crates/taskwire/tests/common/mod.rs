/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and a scripted transport
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for taskwire tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use taskwire::{
    ResponseHead, SessionConfig, SessionEvents, SessionManager, TaskId, TaskSource, Transport,
    TaskwireError,
};
use tracing_subscriber::EnvFilter;
use url::Url;
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Install a subscriber honouring `RUST_LOG`; repeated calls are ignored
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskwire=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Configuration whose relative URLs resolve against the mock server
pub fn config_for(server: &MockServer) -> SessionConfig {
    SessionConfig {
        base_url: Some(Url::parse(&format!("{}/", server.uri())).unwrap()),
        ..SessionConfig::default()
    }
}

/// Manager backed by the reqwest transport, pointed at the mock server
pub fn manager_for(server: &MockServer) -> SessionManager {
    init_tracing();
    SessionManager::new(config_for(server)).unwrap()
}

/// What the scripted transport recorded about a created task
#[derive(Debug, Clone)]
pub struct CreatedTask {
    pub id: TaskId,
    pub kind: &'static str,
    pub url: Option<Url>,
    pub body: Option<Bytes>,
}

/// In-memory transport: records calls, delivers nothing unless told to
pub struct ScriptedTransport {
    next_id: AtomicU64,
    sinks: Mutex<HashMap<TaskId, Arc<dyn SessionEvents>>>,
    created: Mutex<Vec<CreatedTask>>,
    calls: Mutex<Vec<(&'static str, TaskId)>>,
    /// Body delivered synchronously from inside `resume`
    respond_on_resume: Option<Bytes>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Completes every task with `body` the moment it is resumed
    pub fn responding(body: &'static [u8]) -> Arc<Self> {
        Arc::new(Self::build(Some(Bytes::from_static(body))))
    }

    fn build(respond_on_resume: Option<Bytes>) -> Self {
        Self {
            next_id: AtomicU64::new(100),
            sinks: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            respond_on_resume,
        }
    }

    pub fn events(&self, task: TaskId) -> Arc<dyn SessionEvents> {
        Arc::clone(self.sinks.lock().unwrap().get(&task).expect("task was created"))
    }

    pub fn created(&self) -> Vec<CreatedTask> {
        self.created.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<(&'static str, TaskId)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, name: &str, task: TaskId) -> bool {
        self.calls().iter().any(|(call, id)| *call == name && *id == task)
    }
}

pub fn ok_response(url: &str) -> ResponseHead {
    ResponseHead::new(
        Url::parse(url).unwrap(),
        reqwest::StatusCode::OK,
        reqwest::header::HeaderMap::new(),
    )
}

impl Transport for ScriptedTransport {
    fn create_task(
        &self,
        source: TaskSource,
        events: Arc<dyn SessionEvents>,
    ) -> taskwire::Result<TaskId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = match &source {
            TaskSource::Data(request) => CreatedTask {
                id,
                kind: "data",
                url: Some(request.url().clone()),
                body: request
                    .body()
                    .and_then(|body| body.as_bytes())
                    .map(Bytes::copy_from_slice),
            },
            TaskSource::Upload(request, _) => CreatedTask {
                id,
                kind: "upload",
                url: Some(request.url().clone()),
                body: None,
            },
            TaskSource::Download(request) => CreatedTask {
                id,
                kind: "download",
                url: Some(request.url().clone()),
                body: None,
            },
            TaskSource::ResumeDownload(resume) => CreatedTask {
                id,
                kind: "resume_download",
                url: Some(resume.url.clone()),
                body: None,
            },
        };
        self.created.lock().unwrap().push(record);
        self.sinks.lock().unwrap().insert(id, events);
        Ok(id)
    }

    fn resume(&self, task: TaskId) {
        self.calls.lock().unwrap().push(("resume", task));
        if let Some(body) = &self.respond_on_resume {
            let events = self.events(task);
            events.did_receive_response(task, &ok_response("https://scripted.test/"));
            events.did_receive_data(task, body);
            events.did_complete(task, None);
        }
    }

    fn suspend(&self, task: TaskId) {
        self.calls.lock().unwrap().push(("suspend", task));
    }

    fn cancel(&self, task: TaskId) {
        self.calls.lock().unwrap().push(("cancel", task));
    }

    fn cancel_producing_resume_data(&self, task: TaskId) {
        self.calls.lock().unwrap().push(("cancel_producing_resume_data", task));
    }
}

/// Manager over a scripted transport with auto-start switched as given
pub fn scripted_manager(transport: &Arc<ScriptedTransport>, start_immediately: bool) -> SessionManager {
    init_tracing();
    let config = SessionConfig {
        start_requests_immediately: start_immediately,
        ..SessionConfig::default()
    };
    SessionManager::with_transport(config, Arc::clone(transport) as Arc<dyn Transport>).unwrap()
}

/// Cancelled error carrying a resume blob
pub fn cancelled_with(resume_data: &'static [u8]) -> TaskwireError {
    TaskwireError::Cancelled {
        resume_data: Some(Bytes::from_static(resume_data)),
    }
}
