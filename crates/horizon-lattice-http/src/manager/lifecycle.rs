//! Request lifecycle: resolve, cache, register, dispatch, complete.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;

use super::ManagerInner;
use crate::cache::CacheKey;
use crate::config::NetworkConfig;
use crate::error::{NetworkError, Result};
use crate::http::{
    HttpMethod, Parameters, ProgressCallback, RequestBuilder, Response, TransferProgress,
    TransportResponse, resolve_url,
};
use crate::logging::targets;
use crate::task::TaskHandle;
use crate::upload::{MultipartEncoder, UploadPart};

/// Receives the single outcome of a request.
pub(crate) type Completion = Box<dyn FnOnce(Result<Response>) + Send + 'static>;

/// Longest error message kept from a non-success response body.
const MAX_ERROR_MESSAGE: usize = 512;

/// Where a successful body goes.
#[derive(Debug, Clone)]
pub(crate) enum Sink {
    Memory,
    File(PathBuf),
}

/// Everything the caller asked for, before the URL is resolved.
pub(crate) struct Job {
    pub(crate) method: HttpMethod,
    pub(crate) url: String,
    pub(crate) parameters: Parameters,
    pub(crate) cacheable: bool,
    pub(crate) key: Option<String>,
    pub(crate) progress: Option<ProgressCallback>,
    pub(crate) parts: Vec<UploadPart>,
    pub(crate) sink: Sink,
}

impl Job {
    pub(crate) fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            parameters: Parameters::new(),
            cacheable: false,
            key: None,
            progress: None,
            parts: Vec::new(),
            sink: Sink::Memory,
        }
    }

    fn is_upload(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Uploads and downloads bypass the cache.
    fn cache_key(&self, url: &str) -> Option<CacheKey> {
        if !self.cacheable || self.is_upload() || matches!(self.sink, Sink::File(_)) {
            return None;
        }
        CacheKey::derive(self.method, url, &self.parameters)
    }
}

/// Run a job to completion, calling `completion` exactly once.
///
/// Invalid URLs, cache hits and duplicate rejections complete synchronously
/// and return a handle that was never registered.
pub(crate) fn dispatch(inner: &Arc<ManagerInner>, job: Job, completion: Completion) -> TaskHandle {
    let config = inner.config.read().clone();

    let url = match resolve_url(config.base_url.as_deref(), &job.url) {
        Ok(url) => url,
        Err(err) => {
            tracing::debug!(target: targets::MANAGER, url = %job.url, error = %err, "rejected request");
            let handle = TaskHandle::completed(job.url.as_str());
            completion(Err(err));
            return handle;
        }
    };

    let cache_key = job.cache_key(url.as_str());
    if let (Some(key), Some(cache)) = (&cache_key, &inner.cache)
        && let Some(entry) = cache.lookup(key)
    {
        if config.log_enabled {
            tracing::info!(
                target: targets::MANAGER,
                method = %job.method,
                url = %url,
                bytes = entry.size_bytes,
                "served from cache"
            );
        }
        let handle = TaskHandle::completed(url.as_str());
        completion(Ok(Response::cached(url.to_string(), entry.payload)));
        return handle;
    }

    let task_key: Arc<str> = match &job.key {
        Some(key) => key.as_str().into(),
        None => url.as_str().into(),
    };
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let handle = match inner.registry.register(task_key.clone(), cancel_tx) {
        Ok(handle) => handle,
        Err(err) => {
            tracing::debug!(target: targets::MANAGER, key = %task_key, "duplicate request rejected");
            completion(Err(err));
            return TaskHandle::completed(task_key);
        }
    };

    let id = handle.id();
    let task_inner = Arc::clone(inner);
    inner.runtime.spawn(async move {
        let outcome = tokio::select! {
            result = perform(&task_inner, &config, url, job, cache_key) => result,
            _ = cancel_rx => Err(NetworkError::Cancelled),
        };

        // The registry decides: a request cancelled after its transfer
        // finished still reports Cancelled.
        let outcome = if task_inner.registry.complete(&task_key, id) {
            outcome
        } else {
            Err(NetworkError::Cancelled)
        };

        if let Err(err) = &outcome {
            tracing::debug!(target: targets::MANAGER, key = %task_key, error = %err, "request failed");
        }
        completion(outcome);
    });

    handle
}

async fn perform(
    inner: &ManagerInner,
    config: &NetworkConfig,
    url: url::Url,
    job: Job,
    cache_key: Option<CacheKey>,
) -> Result<Response> {
    let is_upload = job.is_upload();
    let Job {
        method,
        parameters,
        progress,
        parts,
        sink,
        ..
    } = job;
    let url_text = url.to_string();
    let builder = RequestBuilder::new(config);

    let descriptor = if is_upload {
        let body = tokio::task::spawn_blocking(move || {
            MultipartEncoder::new().encode(&parameters, parts)
        })
        .await
        .map_err(|e| NetworkError::Io(format!("upload encoder failed: {e}")))??;
        tracing::debug!(
            target: targets::UPLOAD,
            url = %url_text,
            bytes = body.content_length(),
            "multipart body prepared"
        );
        builder.build_with_body(method, url, body.into_request_body(progress.clone()))
    } else {
        builder.build(method, &url, &parameters)?
    };

    let started = Instant::now();
    if config.log_enabled {
        tracing::info!(target: targets::MANAGER, method = %method, url = %url_text, "request started");
    }

    let TransportResponse {
        status,
        headers,
        content_length,
        body,
    } = inner.transport.send(descriptor).await?;

    if !(200..300).contains(&status) {
        let body = read_body(body, None, None).await.unwrap_or_default();
        if config.log_enabled {
            tracing::info!(
                target: targets::MANAGER,
                method = %method,
                url = %url_text,
                status,
                "request finished with error status"
            );
        }
        return Err(NetworkError::HttpStatus {
            status,
            message: error_message(&body),
        });
    }

    let download_progress = if is_upload { None } else { progress.as_ref() };

    if let Sink::File(path) = sink {
        let written = write_body(body, content_length, download_progress, &path).await?;
        if config.log_enabled {
            tracing::info!(
                target: targets::MANAGER,
                url = %url_text,
                status,
                bytes = written,
                path = %path.display(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "download finished"
            );
        }
        return Ok(Response::saved(status, headers, url_text, path));
    }

    let body = read_body(body, content_length, download_progress).await?;
    config.response_serializer.validate(&body)?;

    if config.log_enabled {
        tracing::info!(
            target: targets::MANAGER,
            method = %method,
            url = %url_text,
            status,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request finished"
        );
    }

    if let (Some(key), Some(cache)) = (cache_key, inner.cache.clone()) {
        let payload = body.clone();
        match tokio::task::spawn_blocking(move || cache.store(&key, &payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(target: targets::CACHE, url = %url_text, error = %err, "response not cached");
            }
            Err(err) => {
                tracing::warn!(target: targets::CACHE, url = %url_text, error = %err, "cache store task failed");
            }
        }
    }

    Ok(Response::new(status, headers, url_text, body))
}

fn report(progress: Option<&ProgressCallback>, transferred: u64, total: Option<u64>) {
    if let Some(progress) = progress {
        progress(TransferProgress::new(transferred, total));
    }
}

/// Collect a streamed body, reporting every chunk.
async fn read_body(
    mut body: BoxStream<'static, Result<Bytes>>,
    total: Option<u64>,
    progress: Option<&ProgressCallback>,
) -> Result<Bytes> {
    let capacity = total.unwrap_or(0).min(8 * 1024 * 1024) as usize;
    let mut buffer = BytesMut::with_capacity(capacity);
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        buffer.extend_from_slice(&chunk);
        report(progress, buffer.len() as u64, total);
    }
    Ok(buffer.freeze())
}

/// Stream a body into `path` through a `.part` file renamed on success.
async fn write_body(
    mut body: BoxStream<'static, Result<Bytes>>,
    total: Option<u64>,
    progress: Option<&ProgressCallback>,
    path: &Path,
) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut partial = PartialFile::for_target(path);
    let mut file = tokio::fs::File::create(&partial.path).await?;
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        report(progress, written, total);
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&partial.path, path).await?;
    partial.keep();
    Ok(written)
}

/// Removes an unfinished download, including when the transfer is cancelled.
struct PartialFile {
    path: PathBuf,
    finished: bool,
}

impl PartialFile {
    fn for_target(target: &Path) -> Self {
        let mut name = target
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("download"));
        name.push(".part");
        Self {
            path: target.with_file_name(name),
            finished: false,
        }
    }

    fn keep(&mut self) {
        self.finished = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.finished {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn error_message(body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(MAX_ERROR_MESSAGE).collect())
}
