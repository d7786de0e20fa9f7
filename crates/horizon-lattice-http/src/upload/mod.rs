//! Multipart uploads.
//!
//! Text parameters are sent before file parts. Images are re-encoded up
//! front; files are streamed from disk in chunks.

mod multipart;
mod part;

pub use multipart::{MultipartBody, MultipartEncoder, reencode_image};
pub use part::{ImageFormat, ImageUpload, PartSource, UploadPart, guess_content_type};
