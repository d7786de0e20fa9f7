//! Per-request options and the two ways to receive a result.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::Serialize;
use tokio::sync::oneshot;

use super::NetworkManager;
use super::lifecycle::{Completion, Job, Sink, dispatch};
use crate::error::{NetworkError, Result};
use crate::http::{HttpMethod, Parameters, ProgressCallback, Response, TransferProgress};
use crate::task::TaskHandle;
use crate::upload::UploadPart;

type SuccessCallback = Box<dyn FnOnce(Response) + Send + 'static>;
type FailureCallback = Box<dyn FnOnce(NetworkError) + Send + 'static>;

/// Callbacks for one request.
///
/// Exactly one of `on_success` and `on_failure` is called. Either may run on
/// a runtime worker thread, or synchronously inside the call that started
/// the request (cache hits, invalid URLs, duplicate rejections).
pub struct RequestCallbacks {
    on_success: SuccessCallback,
    on_failure: FailureCallback,
    on_progress: Option<ProgressCallback>,
}

impl RequestCallbacks {
    /// Create callbacks for success and failure.
    pub fn new<S, F>(on_success: S, on_failure: F) -> Self
    where
        S: FnOnce(Response) + Send + 'static,
        F: FnOnce(NetworkError) + Send + 'static,
    {
        Self {
            on_success: Box::new(on_success),
            on_failure: Box::new(on_failure),
            on_progress: None,
        }
    }

    /// Also receive transfer progress.
    #[must_use]
    pub fn with_progress<P>(mut self, on_progress: P) -> Self
    where
        P: Fn(TransferProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    pub(crate) fn into_parts(self) -> (Completion, Option<ProgressCallback>) {
        let Self {
            on_success,
            on_failure,
            on_progress,
        } = self;
        let completion: Completion = Box::new(move |outcome: Result<Response>| match outcome {
            Ok(response) => on_success(response),
            Err(err) => on_failure(err),
        });
        (completion, on_progress)
    }
}

impl std::fmt::Debug for RequestCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCallbacks")
            .field("has_progress", &self.on_progress.is_some())
            .finish_non_exhaustive()
    }
}

/// A request being configured. Nothing is sent until [`send`](Self::send)
/// or [`execute`](Self::execute).
#[must_use = "requests do nothing until sent"]
pub struct RequestOptions {
    manager: NetworkManager,
    job: Job,
}

impl RequestOptions {
    pub(crate) fn new(manager: NetworkManager, method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            manager,
            job: Job::new(method, url),
        }
    }

    /// Replace the request parameters.
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.job.parameters = parameters;
        self
    }

    /// Replace the request parameters with a serializable value.
    pub fn json_parameters<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.job.parameters = Parameters::from_serialize(value)?;
        Ok(self)
    }

    /// Add one parameter.
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.job.parameters.insert(key, value);
        self
    }

    /// Serve from and store into the response cache. Only GET and POST are
    /// ever cached.
    pub fn cache(mut self, cacheable: bool) -> Self {
        self.job.cacheable = cacheable;
        self
    }

    /// Register under `key` instead of the resolved URL.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.job.key = Some(key.into());
        self
    }

    /// Receive transfer progress. Uploads report bytes sent, everything
    /// else bytes received.
    pub fn on_progress<F>(mut self, on_progress: F) -> Self
    where
        F: Fn(TransferProgress) + Send + Sync + 'static,
    {
        self.job.progress = Some(Arc::new(on_progress));
        self
    }

    /// Attach a multipart file part. Any part turns the request into a
    /// multipart upload.
    pub fn part(mut self, part: UploadPart) -> Self {
        self.job.parts.push(part);
        self
    }

    /// Attach several multipart file parts.
    pub fn parts(mut self, parts: impl IntoIterator<Item = UploadPart>) -> Self {
        self.job.parts.extend(parts);
        self
    }

    /// Stream the response body into `path` instead of memory.
    pub fn save_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.job.sink = Sink::File(path.into());
        self
    }

    /// Send the request and report through callbacks.
    pub fn execute(mut self, callbacks: RequestCallbacks) -> TaskHandle {
        let (completion, progress) = callbacks.into_parts();
        if progress.is_some() {
            self.job.progress = progress;
        }
        dispatch(&self.manager.inner, self.job, completion)
    }

    /// Send the request and get an awaitable task.
    ///
    /// Failures known before dispatch (invalid URL, duplicate request) are
    /// returned here; cache hits resolve immediately.
    pub fn send(self) -> Result<RequestTask> {
        let (tx, mut rx) = oneshot::channel();
        let handle = dispatch(
            &self.manager.inner,
            self.job,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );

        if handle.is_detached() {
            match rx.try_recv() {
                Ok(Err(err)) => return Err(err),
                Ok(Ok(response)) => {
                    let (tx, ready) = oneshot::channel();
                    let _ = tx.send(Ok(response));
                    rx = ready;
                }
                Err(_) => {}
            }
        }
        Ok(RequestTask { handle, rx })
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.job.method)
            .field("url", &self.job.url)
            .field("cacheable", &self.job.cacheable)
            .field("parts", &self.job.parts.len())
            .field("sink", &self.job.sink)
            .finish_non_exhaustive()
    }
}

/// An in-flight request that resolves to its [`Response`].
///
/// Dropping the task does not cancel the request; use
/// [`handle`](Self::handle) for that.
#[must_use = "the response is lost unless the task is awaited"]
pub struct RequestTask {
    handle: TaskHandle,
    rx: oneshot::Receiver<Result<Response>>,
}

impl RequestTask {
    /// The cancellation handle.
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    /// Cancel the request. The task then resolves to `Cancelled`.
    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }
}

impl Future for RequestTask {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(NetworkError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for RequestTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTask")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
