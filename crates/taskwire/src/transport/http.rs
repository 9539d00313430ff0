/*
[INPUT]:  Session configuration, task sources, per-task event sinks
[OUTPUT]: reqwest-driven tasks with pause/resume/cancel, redirects, challenges, downloads
[POS]:    Transport seam - default URL-loading backend
[UPDATE]: When changing redirect, authentication, upload or download mechanics
*/

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt, stream};
use reqwest::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, ETAG, HeaderMap, HeaderName, HeaderValue,
    LAST_MODIFIED, LOCATION, PROXY_AUTHORIZATION, WWW_AUTHENTICATE,
};
use reqwest::{Body, Client, Method, Request, Response, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::{ResumeData, SessionEvents, TaskId, TaskSource, Transport, UploadSource, UploadStream};
use crate::config::SessionConfig;
use crate::error::{Result, TaskwireError};
use crate::sync::{lock, read, write};
use crate::types::{
    AuthChallenge, AuthenticationMethod, CacheStoragePolicy, CachedResponse, ChallengeDisposition,
    Credential, ProtectionSpace, RequestHead, ResponseDisposition, ResponseHead,
};

/// Chunk size used when reporting upload progress for in-memory bodies
const UPLOAD_CHUNK_SIZE: usize = 16 * 1024;

/// Transport backed by a reqwest client
pub struct HttpTransport {
    shared: Arc<Shared>,
    runtime: Option<Handle>,
}

struct Shared {
    client: Client,
    max_redirects: u32,
    cache_responses: bool,
    download_dir: PathBuf,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    cache: RwLock<HashMap<String, CachedResponse>>,
}

struct TaskEntry {
    /// Present until the first resume
    pending: Option<PendingTask>,
    control: Arc<TaskControl>,
}

struct PendingTask {
    source: TaskSource,
    events: Arc<dyn SessionEvents>,
}

struct TaskControl {
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    produce_resume_data: AtomicBool,
}

impl HttpTransport {
    /// Build a client from the configured timeouts; redirects are driven here
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Use a caller-built client. It should not follow redirects itself.
    pub fn with_client(client: Client, config: &SessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                max_redirects: config.max_redirects,
                cache_responses: config.cache_responses,
                download_dir: config.download_dir(),
                next_id: AtomicU64::new(1),
                tasks: Mutex::new(HashMap::new()),
                cache: RwLock::new(HashMap::new()),
            }),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Response stored by the cache hook for `url`
    pub fn cached_response(&self, url: &Url) -> Option<CachedResponse> {
        read(&self.shared.cache).get(url.as_str()).cloned()
    }

    /// Tasks created and not yet finished
    pub fn active_tasks(&self) -> usize {
        lock(&self.shared.tasks).len()
    }

    fn runtime(&self) -> Option<Handle> {
        Handle::try_current().ok().or_else(|| self.runtime.clone())
    }

    fn start(&self, task: TaskId, pending: PendingTask, control: Arc<TaskControl>) {
        let Some(runtime) = self.runtime() else {
            warn!(task_id = task, "no tokio runtime available, failing task");
            self.shared.forget(task);
            pending.events.did_complete(
                task,
                Some(TaskwireError::Transport(
                    "no tokio runtime available to run the task".to_string(),
                )),
            );
            return;
        };

        let run = TaskRun {
            shared: Arc::clone(&self.shared),
            paused: control.paused.subscribe(),
            control,
            events: Arc::clone(&pending.events),
        };
        debug!(task_id = task, "transport task started");
        runtime.spawn(run.drive(task, pending.source));
    }

    fn cancel_task(&self, task: TaskId, produce_resume_data: bool) {
        let never_started = {
            let mut tasks = lock(&self.shared.tasks);
            let Some(entry) = tasks.get_mut(&task) else {
                return;
            };
            entry
                .control
                .produce_resume_data
                .store(produce_resume_data, Ordering::Release);
            entry.control.cancel.cancel();
            let pending = entry.pending.take();
            if pending.is_some() {
                tasks.remove(&task);
            }
            pending
        };

        // A task that never ran still owes its sink a completion.
        if let Some(pending) = never_started {
            debug!(task_id = task, "cancelled before start");
            let events = pending.events;
            match self.runtime() {
                Some(runtime) => {
                    runtime.spawn(async move {
                        events.did_complete(task, Some(TaskwireError::cancelled()));
                    });
                }
                None => events.did_complete(task, Some(TaskwireError::cancelled())),
            }
        }
    }
}

impl Transport for HttpTransport {
    fn create_task(&self, source: TaskSource, events: Arc<dyn SessionEvents>) -> Result<TaskId> {
        let id = self.shared.allocate();
        let (paused, _) = watch::channel(false);
        let control = Arc::new(TaskControl {
            cancel: CancellationToken::new(),
            paused,
            produce_resume_data: AtomicBool::new(false),
        });
        lock(&self.shared.tasks).insert(
            id,
            TaskEntry {
                pending: Some(PendingTask { source, events }),
                control,
            },
        );
        debug!(task_id = id, "transport task created");
        Ok(id)
    }

    fn resume(&self, task: TaskId) {
        let start = {
            let mut tasks = lock(&self.shared.tasks);
            let Some(entry) = tasks.get_mut(&task) else {
                return;
            };
            entry.control.paused.send_replace(false);
            entry
                .pending
                .take()
                .map(|pending| (pending, Arc::clone(&entry.control)))
        };
        if let Some((pending, control)) = start {
            self.start(task, pending, control);
        }
    }

    fn suspend(&self, task: TaskId) {
        if let Some(entry) = lock(&self.shared.tasks).get(&task) {
            entry.control.paused.send_replace(true);
        }
    }

    fn cancel(&self, task: TaskId) {
        self.cancel_task(task, false);
    }

    fn cancel_producing_resume_data(&self, task: TaskId) {
        self.cancel_task(task, true);
    }
}

impl Shared {
    fn allocate(&self) -> TaskId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn forget(&self, task: TaskId) {
        lock(&self.tasks).remove(&task);
    }

    /// Register a second id sharing an existing task's controls
    fn adopt(&self, control: Arc<TaskControl>) -> TaskId {
        let id = self.allocate();
        lock(&self.tasks).insert(
            id,
            TaskEntry {
                pending: None,
                control,
            },
        );
        id
    }

    async fn temp_path(&self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.download_dir).await?;
        Ok(self
            .download_dir
            .join(format!("taskwire-{}.tmp", Uuid::new_v4())))
    }

    fn store(&self, cached: CachedResponse) {
        write(&self.cache).insert(cached.response.url.to_string(), cached);
    }
}

/// Request body as it can be (re)produced for each attempt
enum BodySource {
    Empty,
    Bytes { data: Bytes, track: bool },
    File(PathBuf),
    Stream(Option<UploadStream>),
    Opaque(Option<Body>),
}

impl BodySource {
    fn from_request(request: &mut Request) -> Self {
        match request.body_mut().take() {
            None => BodySource::Empty,
            Some(body) => match body.as_bytes() {
                Some(bytes) => BodySource::Bytes {
                    data: Bytes::copy_from_slice(bytes),
                    track: false,
                },
                None => BodySource::Opaque(Some(body)),
            },
        }
    }

    fn from_upload(source: UploadSource) -> Self {
        match source {
            UploadSource::Bytes(data) => BodySource::Bytes { data, track: true },
            UploadSource::File(path) => BodySource::File(path),
            UploadSource::Stream(stream) => BodySource::Stream(Some(stream)),
        }
    }
}

fn with_progress<S>(
    events: Arc<dyn SessionEvents>,
    task: TaskId,
    body: S,
    expected: Option<u64>,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static,
{
    let mut total = 0u64;
    body.inspect(move |item| {
        if let Ok(chunk) = item {
            let sent = chunk.len() as u64;
            total += sent;
            events.did_send_body_data(task, sent, total, expected);
        }
    })
}

/// One running task: drives the request and reports through `events`
struct TaskRun {
    shared: Arc<Shared>,
    control: Arc<TaskControl>,
    paused: watch::Receiver<bool>,
    events: Arc<dyn SessionEvents>,
}

impl TaskRun {
    async fn drive(mut self, id: TaskId, source: TaskSource) {
        let mut current = id;
        let outcome = match source {
            TaskSource::Data(request) => self.run_data(&mut current, request, None).await,
            TaskSource::Upload(request, upload) => {
                self.run_data(&mut current, request, Some(upload)).await
            }
            TaskSource::Download(request) => self.run_download(current, request, None).await,
            TaskSource::ResumeDownload(resume) => match resume.request() {
                Ok(request) => self.run_download(current, request, Some(resume)).await,
                Err(err) => Err(err),
            },
        };

        self.shared.forget(id);
        if current != id {
            self.shared.forget(current);
        }
        match &outcome {
            Err(err) if !err.is_cancelled() => {
                warn!(task_id = current, error = %err, "transport task failed")
            }
            Err(_) => debug!(task_id = current, "transport task cancelled"),
            Ok(()) => debug!(task_id = current, "transport task finished"),
        }
        self.events.did_complete(current, outcome.err());
    }

    async fn wait_while_paused(&mut self) -> Result<()> {
        loop {
            if self.control.cancel.is_cancelled() {
                return Err(TaskwireError::cancelled());
            }
            if !*self.paused.borrow_and_update() {
                return Ok(());
            }
            tokio::select! {
                _ = self.control.cancel.cancelled() => return Err(TaskwireError::cancelled()),
                changed = self.paused.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn guarded<F: Future>(&self, future: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.control.cancel.cancelled() => Err(TaskwireError::cancelled()),
            output = future => Ok(output),
        }
    }

    async fn next_chunk<S>(&mut self, body: &mut S) -> Result<Option<Bytes>>
    where
        S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
    {
        self.wait_while_paused().await?;
        match self.guarded(body.next()).await? {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(err)) => Err(err.into()),
            None => Ok(None),
        }
    }

    async fn next_body(
        &self,
        task: TaskId,
        source: &mut BodySource,
    ) -> Result<Option<Body>> {
        let body = match source {
            BodySource::Empty => return Ok(None),
            BodySource::Bytes { data, track: false } => Body::from(data.clone()),
            BodySource::Bytes { data, track: true } => {
                let data = data.clone();
                let total = data.len();
                let chunks: Vec<std::io::Result<Bytes>> = (0..total)
                    .step_by(UPLOAD_CHUNK_SIZE)
                    .map(|start| Ok(data.slice(start..(start + UPLOAD_CHUNK_SIZE).min(total))))
                    .collect();
                Body::wrap_stream(with_progress(
                    Arc::clone(&self.events),
                    task,
                    stream::iter(chunks),
                    Some(total as u64),
                ))
            }
            BodySource::File(path) => {
                let file = tokio::fs::File::open(&*path).await?;
                let total = file.metadata().await?.len();
                Body::wrap_stream(with_progress(
                    Arc::clone(&self.events),
                    task,
                    ReaderStream::new(file),
                    Some(total),
                ))
            }
            BodySource::Stream(slot) => {
                let body = match slot.take() {
                    Some(body) => body,
                    None => self.events.need_new_body_stream(task).ok_or_else(|| {
                        TaskwireError::Transport("request body stream cannot be replayed".to_string())
                    })?,
                };
                Body::wrap_stream(with_progress(Arc::clone(&self.events), task, body, None))
            }
            BodySource::Opaque(slot) => slot.take().ok_or_else(|| {
                TaskwireError::Transport("request body cannot be replayed".to_string())
            })?,
        };
        Ok(Some(body))
    }

    /// Send the request, answering redirects and Basic challenges in between
    async fn send(
        &mut self,
        task: TaskId,
        mut head: RequestHead,
        body: &mut BodySource,
    ) -> Result<Response> {
        let mut redirects = 0u32;
        let mut failures = 0u32;
        let mut authorization: Option<HeaderValue> = None;

        loop {
            self.wait_while_paused().await?;
            let mut request = head.to_request();
            if let Some(value) = &authorization {
                request.headers_mut().insert(AUTHORIZATION, value.clone());
            }
            *request.body_mut() = self.next_body(task, body).await?;

            let response = self.guarded(self.shared.client.execute(request)).await??;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                let Some(challenge) = basic_challenge(&head.url, &response, failures) else {
                    return Ok(response);
                };
                let (disposition, credential) = self.events.did_receive_challenge(task, &challenge);
                debug!(task_id = task, ?disposition, failures, "authentication challenge answered");
                match (disposition, credential) {
                    (ChallengeDisposition::CancelChallenge, _) => {
                        return Err(TaskwireError::cancelled());
                    }
                    (
                        ChallengeDisposition::UseCredential,
                        Some(Credential::UserPassword { user, password }),
                    ) => {
                        authorization = Some(basic_authorization(&user, &password)?);
                        failures += 1;
                        continue;
                    }
                    (ChallengeDisposition::PerformDefaultHandling, _) => return Ok(response),
                    (disposition, _) => {
                        debug!(
                            task_id = task,
                            ?disposition,
                            "challenge answer not usable for basic auth, delivering 401"
                        );
                        return Ok(response);
                    }
                }
            }

            if status.is_redirection() {
                let Some(proposed) = redirect_target(&head, response.status(), response.headers())? else {
                    return Ok(response);
                };
                if redirects >= self.shared.max_redirects {
                    return Err(TaskwireError::TooManyRedirects {
                        limit: self.shared.max_redirects,
                    });
                }
                let response_head = ResponseHead::from_response(&response);
                match self.events.will_perform_redirect(task, &response_head, proposed) {
                    Some(next) => {
                        info!(
                            task_id = task,
                            from = %head.url,
                            to = %next.url,
                            status = status.as_u16(),
                            "following redirect"
                        );
                        if next.method == Method::GET || next.method == Method::HEAD {
                            *body = BodySource::Empty;
                        }
                        if !same_origin(&next.url, &head.url) {
                            authorization = None;
                            failures = 0;
                        }
                        head = next;
                        redirects += 1;
                        continue;
                    }
                    None => return Ok(response),
                }
            }

            return Ok(response);
        }
    }

    async fn run_data(
        &mut self,
        task: &mut TaskId,
        mut request: Request,
        upload: Option<UploadSource>,
    ) -> Result<()> {
        let mut body = match upload {
            Some(source) => BodySource::from_upload(source),
            None => BodySource::from_request(&mut request),
        };
        let head = RequestHead::from_request(&request);
        let is_get = head.method == Method::GET;
        let response = self.send(*task, head, &mut body).await?;
        let response_head = ResponseHead::from_response(&response);

        match self.events.did_receive_response(*task, &response_head) {
            ResponseDisposition::Allow => {}
            ResponseDisposition::Cancel => return Err(TaskwireError::cancelled()),
            ResponseDisposition::BecomeDownload => {
                let download = self.shared.adopt(Arc::clone(&self.control));
                info!(task_id = *task, download_task = download, "data task became download");
                self.events.did_become_download(*task, download);
                *task = download;
                let path = self.shared.temp_path().await?;
                return self.stream_to_file(download, response, path, 0).await;
            }
        }

        let cacheable = self.shared.cache_responses && is_get && response_head.status.is_success();
        let mut collected = BytesMut::new();
        let chunks = response.bytes_stream();
        tokio::pin!(chunks);
        while let Some(chunk) = self.next_chunk(&mut chunks).await? {
            if cacheable {
                collected.extend_from_slice(&chunk);
            }
            self.events.did_receive_data(*task, &chunk);
        }

        if cacheable {
            let proposed = CachedResponse {
                response: response_head,
                data: collected.freeze(),
                storage: CacheStoragePolicy::AllowedInMemoryOnly,
            };
            if let Some(accepted) = self.events.will_cache_response(*task, proposed) {
                if accepted.storage != CacheStoragePolicy::NotAllowed {
                    debug!(task_id = *task, url = %accepted.response.url, "response cached");
                    self.shared.store(accepted);
                }
            }
        }
        Ok(())
    }

    async fn run_download(
        &mut self,
        task: TaskId,
        mut request: Request,
        resume: Option<ResumeData>,
    ) -> Result<()> {
        let mut body = BodySource::from_request(&mut request);
        let head = RequestHead::from_request(&request);
        let response = self.send(task, head, &mut body).await?;
        let response_head = ResponseHead::from_response(&response);
        // Downloads take no disposition; the head is still reported.
        let _ = self.events.did_receive_response(task, &response_head);

        let resuming = resume.is_some();
        let (path, offset) = match resume {
            Some(resume)
                if response.status() == StatusCode::PARTIAL_CONTENT
                    && tokio::fs::try_exists(&resume.temp_path).await.unwrap_or(false) =>
            {
                (resume.temp_path, resume.offset)
            }
            Some(resume) => {
                debug!(task_id = task, status = response.status().as_u16(), "server restarted download");
                let _ = tokio::fs::remove_file(&resume.temp_path).await;
                (self.shared.temp_path().await?, 0)
            }
            None => (self.shared.temp_path().await?, 0),
        };

        if resuming {
            info!(task_id = task, offset, "download resumed");
            let expected = response.content_length().map(|len| len + offset);
            self.events.did_resume_at_offset(task, offset, expected);
        }
        self.stream_to_file(task, response, path, offset).await
    }

    async fn stream_to_file(
        &mut self,
        task: TaskId,
        response: Response,
        path: PathBuf,
        offset: u64,
    ) -> Result<()> {
        let expected = response.content_length().map(|len| len + offset);
        let url = response.url().clone();
        let etag = header_string(response.headers(), ETAG);
        let last_modified = header_string(response.headers(), LAST_MODIFIED);

        let mut file = if offset > 0 {
            tokio::fs::OpenOptions::new().append(true).open(&path).await?
        } else {
            tokio::fs::File::create(&path).await?
        };

        let mut written = offset;
        let chunks = response.bytes_stream();
        tokio::pin!(chunks);
        loop {
            let chunk = match self.next_chunk(&mut chunks).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => {
                    let _ = file.flush().await;
                    drop(file);
                    let partial = ResumeData {
                        url,
                        temp_path: path,
                        offset: written,
                        etag,
                        last_modified,
                    };
                    return Err(self.interrupted(task, err, partial).await);
                }
            };
            discard_on_error(task, &path, file.write_all(&chunk).await).await?;
            written += chunk.len() as u64;
            self.events
                .did_write_data(task, chunk.len() as u64, written, expected);
        }
        discard_on_error(task, &path, file.flush().await).await?;
        drop(file);

        debug!(task_id = task, bytes = written, location = %path.display(), "download written");
        self.events.did_finish_downloading(task, &path);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let _ = tokio::fs::remove_file(&path).await;
        }
        Ok(())
    }

    /// Turn an interrupted download into its final error, keeping the
    /// partial file only when resume data was asked for
    async fn interrupted(&self, task: TaskId, err: TaskwireError, partial: ResumeData) -> TaskwireError {
        if err.is_cancelled()
            && partial.offset > 0
            && self.control.produce_resume_data.load(Ordering::Acquire)
        {
            match partial.to_bytes() {
                Ok(blob) => {
                    info!(task_id = task, offset = partial.offset, "resume data produced");
                    return TaskwireError::Cancelled {
                        resume_data: Some(blob),
                    };
                }
                Err(encode_err) => {
                    warn!(task_id = task, error = %encode_err, "failed to encode resume data")
                }
            }
        }
        let _ = tokio::fs::remove_file(&partial.temp_path).await;
        err
    }
}

/// Remove the in-flight file when writing to it failed
async fn discard_on_error<T>(task: TaskId, path: &Path, result: std::io::Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            warn!(task_id = task, location = %path.display(), error = %err, "download write failed");
            let _ = tokio::fs::remove_file(path).await;
            Err(err.into())
        }
    }
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Next hop for a 3xx carrying a Location header. Credentials and cookies
/// are not carried to another origin.
fn redirect_target(
    head: &RequestHead,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<Option<RequestHead>> {
    let Some(location) = headers.get(LOCATION) else {
        return Ok(None);
    };
    let location = location
        .to_str()
        .map_err(|err| TaskwireError::Transport(format!("invalid Location header: {err}")))?;
    let url = head
        .url
        .join(location)
        .map_err(|err| TaskwireError::Transport(format!("invalid redirect target: {err}")))?;

    let mut next = head.clone();
    next.url = url;
    if !same_origin(&next.url, &head.url) {
        for name in [AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION, WWW_AUTHENTICATE] {
            next.headers.remove(name);
        }
    }
    let rewrites_to_get = matches!(
        status,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
    );
    if rewrites_to_get && next.method != Method::GET && next.method != Method::HEAD {
        next.method = Method::GET;
        next.headers.remove(CONTENT_TYPE);
        next.headers.remove(CONTENT_LENGTH);
    }
    Ok(Some(next))
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

fn basic_challenge(url: &Url, response: &Response, failures: u32) -> Option<AuthChallenge> {
    let header = response
        .headers()
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| {
            value
                .trim_start()
                .get(..5)
                .is_some_and(|scheme| scheme.eq_ignore_ascii_case("basic"))
        })?;

    Some(AuthChallenge {
        protection_space: ProtectionSpace::for_url(
            url,
            parse_realm(header),
            AuthenticationMethod::HttpBasic,
        ),
        previous_failure_count: failures,
        proposed_credential: None,
        failure_response: Some(ResponseHead::from_response(response)),
    })
}

fn parse_realm(header: &str) -> Option<String> {
    let start = header.to_ascii_lowercase().find("realm=")? + "realm=".len();
    let rest = header.get(start..)?;
    let realm = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next()?,
        None => rest.split(',').next()?.trim(),
    };
    Some(realm.to_string())
}

fn basic_authorization(user: &str, password: &str) -> Result<HeaderValue> {
    let token = BASE64.encode(format!("{user}:{password}"));
    let mut value = HeaderValue::from_str(&format!("Basic {token}"))
        .map_err(|err| TaskwireError::Transport(format!("invalid credential: {err}")))?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_realm() {
        assert_eq!(parse_realm(r#"Basic realm="api", charset="UTF-8""#).as_deref(), Some("api"));
        assert_eq!(parse_realm("Basic Realm=zone, x=1").as_deref(), Some("zone"));
        assert_eq!(parse_realm("Basic"), None);
    }

    #[test]
    fn test_basic_authorization_header() {
        let value = basic_authorization("user", "pass").unwrap();
        assert_eq!(value.to_str().unwrap(), "Basic dXNlcjpwYXNz");
        assert!(value.is_sensitive());
    }

    fn redirect_from(url: &str, status: StatusCode, location: &str) -> RequestHead {
        let mut head = RequestHead::new(Method::POST, Url::parse(url).unwrap());
        head.headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        head.headers.insert(COOKIE, HeaderValue::from_static("session=1"));
        head.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_str(location).unwrap());
        redirect_target(&head, status, &headers).unwrap().unwrap()
    }

    #[test]
    fn test_redirect_keeps_credentials_on_same_origin() {
        let next = redirect_from("https://example.com/a", StatusCode::TEMPORARY_REDIRECT, "/b");
        assert_eq!(next.url.as_str(), "https://example.com/b");
        assert_eq!(next.method, Method::POST);
        assert!(next.headers.contains_key(AUTHORIZATION));
        assert!(next.headers.contains_key(COOKIE));
    }

    #[test]
    fn test_redirect_drops_credentials_across_origins() {
        for location in [
            "https://other.example.com/b",
            "https://example.com:8443/b",
            "http://example.com/b",
        ] {
            let next = redirect_from("https://example.com/a", StatusCode::FOUND, location);
            assert!(!next.headers.contains_key(AUTHORIZATION), "{location}");
            assert!(!next.headers.contains_key(COOKIE), "{location}");
            assert_eq!(next.method, Method::GET);
            assert!(!next.headers.contains_key(CONTENT_TYPE));
        }
    }

    #[test]
    fn test_same_origin_uses_default_ports() {
        let a = Url::parse("https://example.com/a").unwrap();
        assert!(same_origin(&a, &Url::parse("https://example.com:443/b").unwrap()));
        assert!(!same_origin(&a, &Url::parse("http://example.com:443/b").unwrap()));
    }

    #[tokio::test]
    async fn test_failed_write_removes_inflight_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskwire-1.tmp");
        std::fs::write(&path, b"partial").unwrap();

        let kept = discard_on_error(1, &path, Ok(3)).await.unwrap();
        assert_eq!(kept, 3);
        assert!(path.exists());

        let failed: std::io::Result<()> = Err(std::io::Error::other("no space left on device"));
        let err = discard_on_error(1, &path, failed).await.unwrap_err();
        assert!(matches!(err, TaskwireError::Io(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_body_source_keeps_buffered_bytes() {
        let mut request = Request::new(Method::POST, Url::parse("https://example.com").unwrap());
        *request.body_mut() = Some(Body::from("a=1"));
        match BodySource::from_request(&mut request) {
            BodySource::Bytes { data, track } => {
                assert_eq!(data.as_ref(), b"a=1");
                assert!(!track);
            }
            _ => panic!("expected buffered body"),
        }
        assert!(request.body().is_none());
    }
}
