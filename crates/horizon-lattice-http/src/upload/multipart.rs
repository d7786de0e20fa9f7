//! `multipart/form-data` encoding with a precomputed length.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use tokio::io::AsyncReadExt;

use super::part::{ImageFormat, PartSource, UploadPart};
use crate::error::{NetworkError, Result};
use crate::http::{Parameters, ProgressCallback, RequestBody, TransferProgress};
use crate::logging::targets;

/// Size of the chunks read from disk for file parts.
const FILE_CHUNK_SIZE: usize = 64 * 1024;

enum Segment {
    Bytes(Bytes),
    File { path: PathBuf, len: u64 },
}

impl Segment {
    fn len(&self) -> u64 {
        match self {
            Self::Bytes(data) => data.len() as u64,
            Self::File { len, .. } => *len,
        }
    }
}

/// An encoded multipart body, ready to be streamed.
///
/// Images are already re-encoded and file sizes already read, so the total
/// length is known before anything is sent.
pub struct MultipartBody {
    boundary: String,
    segments: Vec<Segment>,
    content_length: u64,
}

impl MultipartBody {
    /// The boundary separating parts.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// The `Content-Type` header value.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Total body length in bytes.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Stream the body, reporting cumulative progress after every chunk.
    ///
    /// Fails with [`NetworkError::Io`] if a file changed size since encoding.
    pub fn into_stream(self, progress: Option<ProgressCallback>) -> BoxStream<'static, Result<Bytes>> {
        let total = self.content_length;
        let segments = self.segments;

        let stream = async_stream::try_stream! {
            let mut sent = 0u64;
            for segment in segments {
                match segment {
                    Segment::Bytes(data) => {
                        sent += data.len() as u64;
                        yield data;
                        if let Some(ref progress) = progress {
                            progress(TransferProgress::new(sent, Some(total)));
                        }
                    }
                    Segment::File { path, len } => {
                        let mut file = tokio::fs::File::open(&path).await?;
                        let mut remaining = len;
                        let mut buffer = vec![0u8; FILE_CHUNK_SIZE];
                        while remaining > 0 {
                            let want = remaining.min(FILE_CHUNK_SIZE as u64) as usize;
                            let read = file.read(&mut buffer[..want]).await?;
                            if read == 0 {
                                Err::<(), _>(NetworkError::Io(format!(
                                    "{} shrank during upload",
                                    path.display()
                                )))?;
                            }
                            remaining -= read as u64;
                            sent += read as u64;
                            yield Bytes::copy_from_slice(&buffer[..read]);
                            if let Some(ref progress) = progress {
                                progress(TransferProgress::new(sent, Some(total)));
                            }
                        }
                    }
                }
            }
        };
        stream.boxed()
    }

    /// Convert into a streamed request body.
    pub fn into_request_body(self, progress: Option<ProgressCallback>) -> RequestBody {
        let content_type = self.content_type();
        let length = Some(self.content_length);
        RequestBody::Stream {
            content_type,
            length,
            stream: self.into_stream(progress),
        }
    }
}

impl std::fmt::Debug for MultipartBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartBody")
            .field("boundary", &self.boundary)
            .field("segments", &self.segments.len())
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// Builds [`MultipartBody`] values.
#[derive(Debug)]
pub struct MultipartEncoder {
    boundary: String,
}

impl Default for MultipartEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartEncoder {
    /// Create an encoder with a fresh boundary.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::with_boundary(format!("----LatticeBoundary{nanos:016x}{n:08x}"))
    }

    /// Create an encoder with a fixed boundary.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
        }
    }

    /// Encode text parameters followed by file parts.
    ///
    /// Blocks on image re-encoding and file metadata lookups.
    pub fn encode(self, parameters: &Parameters, parts: Vec<UploadPart>) -> Result<MultipartBody> {
        let boundary = self.boundary;
        let mut segments = Vec::with_capacity(parameters.len() + parts.len() * 3 + 1);

        for (name, value) in parameters.to_pairs() {
            let mut text = format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n",
                escape_quoted(&name)
            );
            text.push_str(&value);
            text.push_str("\r\n");
            segments.push(Segment::Bytes(Bytes::from(text)));
        }

        for part in parts {
            let header = format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                escape_quoted(&part.field_name),
                escape_quoted(&part.file_name),
                part.content_type
            );
            segments.push(Segment::Bytes(Bytes::from(header)));

            let payload = match part.source {
                PartSource::Bytes(data) => Segment::Bytes(data),
                PartSource::Image {
                    data,
                    format,
                    quality,
                } => Segment::Bytes(reencode_image(&data, format, quality)?),
                PartSource::File(path) => {
                    let metadata = std::fs::metadata(&path).map_err(|e| {
                        NetworkError::Io(format!("cannot read {}: {e}", path.display()))
                    })?;
                    if !metadata.is_file() {
                        return Err(NetworkError::Io(format!(
                            "{} is not a file",
                            path.display()
                        )));
                    }
                    Segment::File {
                        path,
                        len: metadata.len(),
                    }
                }
            };
            segments.push(payload);
            segments.push(Segment::Bytes(Bytes::from_static(b"\r\n")));
        }

        segments.push(Segment::Bytes(Bytes::from(format!("--{boundary}--\r\n"))));

        let content_length = segments.iter().map(Segment::len).sum();
        tracing::debug!(
            target: targets::UPLOAD,
            parameters = parameters.len(),
            content_length,
            "encoded multipart body"
        );

        Ok(MultipartBody {
            boundary,
            segments,
            content_length,
        })
    }
}

/// Decode an image and encode it again in `format`.
///
/// `quality` is clamped to 0.0..=1.0 and mapped to JPEG quality 1..=100.
pub fn reencode_image(data: &[u8], format: ImageFormat, quality: f32) -> Result<Bytes> {
    let img = image::load_from_memory(data)?;
    let mut buffer = Cursor::new(Vec::new());
    match format {
        ImageFormat::Png => {
            img.write_to(&mut buffer, image::ImageFormat::Png)?;
        }
        ImageFormat::Jpeg => {
            let quality = jpeg_quality(quality);
            let rgb = img.to_rgb8();
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
            encoder.encode(
                &rgb,
                rgb.width(),
                rgb.height(),
                image::ExtendedColorType::Rgb8,
            )?;
        }
    }
    Ok(Bytes::from(buffer.into_inner()))
}

fn jpeg_quality(quality: f32) -> u8 {
    let quality = if quality.is_finite() {
        quality.clamp(0.0, 1.0)
    } else {
        1.0
    };
    (quality * 99.0).round() as u8 + 1
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}
