//! Upload parts.

use std::path::{Path, PathBuf};

use bytes::Bytes;

/// Encoding applied to uploaded images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Lossless PNG; the quality factor is ignored.
    Png,
    /// JPEG at the part's quality factor.
    #[default]
    Jpeg,
}

impl ImageFormat {
    /// MIME type of the encoded image.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Where a part's payload comes from.
#[derive(Clone, Debug)]
pub enum PartSource {
    /// An image that is decoded and re-encoded before upload.
    Image {
        /// The source image in any format the `image` crate can decode.
        data: Bytes,
        /// Output encoding.
        format: ImageFormat,
        /// Compression factor from 0.0 (smallest) to 1.0 (best quality).
        quality: f32,
    },
    /// A file streamed from disk.
    File(PathBuf),
    /// Raw bytes sent as-is.
    Bytes(Bytes),
}

/// One file part of a multipart upload.
#[derive(Clone, Debug)]
pub struct UploadPart {
    /// Form field name.
    pub field_name: String,
    /// File name announced to the server.
    pub file_name: String,
    /// MIME type of the payload.
    pub content_type: String,
    /// The payload.
    pub source: PartSource,
}

impl UploadPart {
    /// An image part, re-encoded as `format` with the given quality.
    pub fn image(
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        data: impl Into<Bytes>,
        format: ImageFormat,
        quality: f32,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            content_type: format.mime_type().to_string(),
            source: PartSource::Image {
                data: data.into(),
                format,
                quality,
            },
        }
    }

    /// A file part streamed from `path`.
    ///
    /// The file name and content type are derived from the path.
    pub fn file(field_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        Self {
            field_name: field_name.into(),
            file_name,
            content_type: guess_content_type(&path).to_string(),
            source: PartSource::File(path),
        }
    }

    /// A part with an in-memory payload.
    pub fn bytes(
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            source: PartSource::Bytes(data.into()),
        }
    }

    /// Override the announced file name.
    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Override the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// A batch of images uploaded under one form field.
#[derive(Clone, Debug)]
pub struct ImageUpload {
    /// Form field name shared by every image.
    pub field_name: String,
    /// Source images.
    pub images: Vec<Bytes>,
    /// File names, matched to images by position. Missing names are generated.
    pub file_names: Vec<String>,
    /// Output encoding.
    pub format: ImageFormat,
    /// Compression factor from 0.0 to 1.0.
    pub quality: f32,
}

impl ImageUpload {
    /// JPEG images at full quality.
    pub fn new(field_name: impl Into<String>, images: Vec<Bytes>) -> Self {
        Self {
            field_name: field_name.into(),
            images,
            file_names: Vec::new(),
            format: ImageFormat::Jpeg,
            quality: 1.0,
        }
    }

    /// Set the file names announced for each image.
    #[must_use]
    pub fn with_file_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the output encoding.
    #[must_use]
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the compression factor.
    #[must_use]
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    /// One part per image.
    pub fn into_parts(self) -> Vec<UploadPart> {
        let Self {
            field_name,
            images,
            file_names,
            format,
            quality,
        } = self;
        let mut names = file_names.into_iter();
        images
            .into_iter()
            .enumerate()
            .map(|(index, data)| {
                let file_name = names
                    .next()
                    .unwrap_or_else(|| format!("{field_name}{index}.{}", format.extension()));
                UploadPart::image(field_name.clone(), file_name, data, format, quality)
            })
            .collect()
    }
}

/// Guess a MIME type from a file extension.
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("webm") => "video/webm",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_part_derives_metadata() {
        let part = UploadPart::file("video", "/tmp/clips/holiday.MOV");
        assert_eq!(part.file_name, "holiday.MOV");
        assert_eq!(part.content_type, "video/quicktime");
        assert!(matches!(part.source, PartSource::File(_)));
    }

    #[test]
    fn test_image_part_content_type() {
        let part = UploadPart::image("photo", "a.png", vec![1u8, 2, 3], ImageFormat::Png, 1.0);
        assert_eq!(part.content_type, "image/png");
        let part = part.with_file_name("b.png").with_content_type("image/x-custom");
        assert_eq!(part.file_name, "b.png");
        assert_eq!(part.content_type, "image/x-custom");
    }

    #[test]
    fn test_image_upload_names_missing_files() {
        let batch = ImageUpload::new("photos", vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")])
            .with_file_names(["first.png"])
            .with_format(ImageFormat::Png);
        let parts = batch.into_parts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].file_name, "first.png");
        assert_eq!(parts[1].file_name, "photos1.png");
        assert!(parts.iter().all(|p| p.field_name == "photos" && p.content_type == "image/png"));
    }

    #[test]
    fn test_guess_content_type_fallback() {
        assert_eq!(guess_content_type(Path::new("data.bin")), "application/octet-stream");
        assert_eq!(guess_content_type(Path::new("noext")), "application/octet-stream");
    }
}
