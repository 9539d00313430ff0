/*
[INPUT]:  Session configuration, task descriptions (method, URL, parameters, bodies)
[OUTPUT]: Submitted tasks registered with the router and handed to the transport
[POS]:    Session layer - session manager
[UPDATE]: When adding submission entry points or changing request preparation
*/

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use reqwest::Request;
use reqwest::header::HeaderMap;
use tracing::{debug, warn};
use url::Url;

use super::credentials::CredentialStore;
use super::delegate::{DelegateKind, TaskDelegate};
use super::router::SessionEventRouter;
use super::task::NetworkTask;
use crate::config::SessionConfig;
use crate::encoding::ParameterEncoding;
use crate::error::{Result, TaskwireError};
use crate::sync::lock;
use crate::transport::{
    HttpTransport, ResumeData, SessionEvents, TaskSource, Transport, UploadSource,
};
use crate::types::{HttpMethod, Parameters, RequestHead, ResponseHead};

static SHARED: OnceCell<SessionManager> = OnceCell::new();

/// Owns one transport session and the registry of its tasks
pub struct SessionManager {
    config: SessionConfig,
    default_headers: HeaderMap,
    transport: Arc<dyn Transport>,
    router: Arc<SessionEventRouter>,
    credentials: Arc<CredentialStore>,
    /// Held from task creation until the delegate is registered
    creation: Mutex<()>,
}

impl SessionManager {
    /// Manager backed by an [`HttpTransport`] built from `config`
    pub fn new(config: SessionConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(config: SessionConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let default_headers = config.header_map()?;
        Ok(Self {
            config,
            default_headers,
            transport,
            router: Arc::new(SessionEventRouter::new()),
            credentials: Arc::new(CredentialStore::new()),
            creation: Mutex::new(()),
        })
    }

    /// Process-wide manager with default configuration, created on first use
    pub fn shared() -> Result<&'static SessionManager> {
        SHARED.get_or_try_init(|| Self::new(SessionConfig::default()))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn router(&self) -> &Arc<SessionEventRouter> {
        &self.router
    }

    /// Tasks registered and not yet completed
    pub fn active_task_count(&self) -> usize {
        self.router.len()
    }

    /// Data task from a method, URL and parameters.
    ///
    /// A URL that cannot be resolved fails without creating a task. A
    /// parameter encoding failure does not: the request goes out unmodified
    /// and the task carries the encoding error.
    pub fn task(
        &self,
        method: HttpMethod,
        url: &str,
        parameters: Option<&Parameters>,
        encoding: &ParameterEncoding,
        headers: Option<&HeaderMap>,
    ) -> Result<NetworkTask> {
        let mut request = Request::new(method.into(), self.resolve_url(url)?);
        if let Some(headers) = headers {
            request.headers_mut().extend(headers.clone());
        }
        let (request, encoding_error) = encoding.encode(request, parameters);
        self.submit_data(request, DelegateKind::data(), encoding_error)
    }

    /// Data task from a prepared request, without parameter encoding
    pub fn task_with_request(&self, request: Request) -> Result<NetworkTask> {
        self.submit_data(request, DelegateKind::data(), None)
    }

    /// Task reporting status and headers while discarding the body
    pub fn plain_task(&self, request: Request) -> Result<NetworkTask> {
        self.submit_data(request, DelegateKind::Plain, None)
    }

    pub fn upload(&self, request: Request, source: UploadSource) -> Result<NetworkTask> {
        let request = self.prepare(request)?;
        let head = RequestHead::from_request(&request);
        self.submit(
            TaskSource::Upload(request, source),
            DelegateKind::upload(),
            Some(head),
            None,
        )
    }

    /// Download task; `destination` maps the finished temporary file (and
    /// response) to where it is moved
    pub fn download<F>(&self, request: Request, destination: F) -> Result<NetworkTask>
    where
        F: Fn(&Path, Option<&ResponseHead>) -> PathBuf + Send + Sync + 'static,
    {
        let request = self.prepare(request)?;
        let head = RequestHead::from_request(&request);
        self.submit(
            TaskSource::Download(request),
            DelegateKind::download(Arc::new(destination)),
            Some(head),
            None,
        )
    }

    /// Continue a download from resume data captured on cancellation
    pub fn download_resuming<F>(&self, resume_data: &[u8], destination: F) -> Result<NetworkTask>
    where
        F: Fn(&Path, Option<&ResponseHead>) -> PathBuf + Send + Sync + 'static,
    {
        let resume = ResumeData::from_bytes(resume_data)?;
        let head = RequestHead::from_request(&resume.request()?);
        self.submit(
            TaskSource::ResumeDownload(resume),
            DelegateKind::download(Arc::new(destination)),
            Some(head),
            None,
        )
    }

    fn submit_data(
        &self,
        request: Request,
        kind: DelegateKind,
        encoding_error: Option<TaskwireError>,
    ) -> Result<NetworkTask> {
        let request = self.prepare(request)?;
        let head = RequestHead::from_request(&request);
        self.submit(TaskSource::Data(request), kind, Some(head), encoding_error)
    }

    /// Create, register, then optionally resume, all under the creation lock
    fn submit(
        &self,
        source: TaskSource,
        kind: DelegateKind,
        request: Option<RequestHead>,
        initial_error: Option<TaskwireError>,
    ) -> Result<NetworkTask> {
        let _creation = lock(&self.creation);

        let events: Arc<dyn SessionEvents> = Arc::clone(&self.router) as Arc<dyn SessionEvents>;
        let id = self.transport.create_task(source, events)?;
        if let Some(error) = &initial_error {
            warn!(task_id = id, error = %error, "parameters not encoded, sending request unmodified");
        }

        let delegate = Arc::new(TaskDelegate::new(
            id,
            kind,
            request,
            Arc::clone(&self.credentials),
            initial_error,
        ));
        self.router.register(Arc::clone(&delegate));

        let task = NetworkTask::new(
            delegate,
            Arc::clone(&self.transport),
            Arc::clone(&self.router),
        );
        if self.config.start_requests_immediately {
            task.resume();
        }
        Ok(task)
    }

    /// Join `url` onto the base URL and check it can be sent
    fn resolve_url(&self, url: &str) -> Result<Url> {
        let resolved = match &self.config.base_url {
            Some(base) => base.join(url),
            None => Url::parse(url),
        }
        .map_err(|err| TaskwireError::MalformedRequest(format!("invalid URL {url:?}: {err}")))?;
        validate_url(&resolved)?;
        Ok(resolved)
    }

    /// Validate the URL and add default headers the request does not set
    fn prepare(&self, mut request: Request) -> Result<Request> {
        validate_url(request.url())?;
        let headers = request.headers_mut();
        for (name, value) in &self.default_headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        debug!(method = %request.method(), url = %request.url(), "request prepared");
        Ok(request)
    }
}

fn validate_url(url: &Url) -> Result<()> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TaskwireError::MalformedRequest(format!(
            "unsupported scheme {:?} in {url}",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(TaskwireError::MalformedRequest(format!("missing host in {url}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url(&Url::parse("https://example.com/a").unwrap()).is_ok());
        assert!(matches!(
            validate_url(&Url::parse("ftp://example.com/a").unwrap()),
            Err(TaskwireError::MalformedRequest(_))
        ));
        assert!(matches!(
            validate_url(&Url::parse("mailto:someone@example.com").unwrap()),
            Err(TaskwireError::MalformedRequest(_))
        ));
    }
}
