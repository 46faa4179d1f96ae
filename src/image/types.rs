//! Core types for image editing.

use crate::error::{EditError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Image formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Maps a MIME type back to a format.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// An image picked by the user, ready to be edited.
///
/// The payload is shared so that building an [`EditRequest`] per submission
/// does not copy the bytes.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Raw image bytes.
    pub data: Arc<[u8]>,
    /// Detected format.
    pub format: ImageFormat,
    /// File name the image was selected from.
    pub name: String,
}

impl UploadedImage {
    /// Builds an upload from bytes, detecting the format from magic bytes and
    /// falling back to the extension of `name`.
    pub fn from_bytes(data: Vec<u8>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if data.is_empty() {
            return Err(EditError::UnsupportedImage(format!("{name} is empty")));
        }
        let format = ImageFormat::from_magic_bytes(&data)
            .or_else(|| {
                Path::new(&name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(ImageFormat::from_extension)
            })
            .ok_or_else(|| {
                EditError::UnsupportedImage(format!("{name} is not a PNG, JPEG or WEBP image"))
            })?;

        Ok(Self {
            data: data.into(),
            format,
            name,
        })
    }

    /// Reads an upload from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(data, name)
    }

    /// Returns the MIME type of the upload.
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// A single edit submission: image payload plus instruction.
///
/// The credential travels separately so requests can be logged safely.
#[derive(Debug, Clone)]
pub struct EditRequest {
    /// Image bytes to edit.
    pub image: Arc<[u8]>,
    /// Declared MIME type of `image`.
    pub mime_type: String,
    /// Natural-language edit instruction.
    pub instruction: String,
}

impl EditRequest {
    /// Creates a new request.
    pub fn new(
        image: impl Into<Arc<[u8]>>,
        mime_type: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            image: image.into(),
            mime_type: mime_type.into(),
            instruction: instruction.into(),
        }
    }

    /// Creates a request for an uploaded image.
    pub fn for_upload(upload: &UploadedImage, instruction: impl Into<String>) -> Self {
        Self {
            image: Arc::clone(&upload.data),
            mime_type: upload.mime_type().to_string(),
            instruction: instruction.into(),
        }
    }

    /// Checks the preconditions that must hold before any network call.
    pub fn validate(&self) -> Result<()> {
        if self.image.is_empty() {
            return Err(EditError::InvalidRequest(
                "Please select an image to edit.".into(),
            ));
        }
        if self.instruction.trim().is_empty() {
            return Err(EditError::InvalidRequest(
                "Please enter a prompt to describe your edit.".into(),
            ));
        }
        Ok(())
    }
}

/// An edited image returned by the model.
#[derive(Debug, Clone)]
#[must_use = "edited image should be displayed or saved"]
pub struct EditedImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Content type exactly as reported by the response part.
    pub mime_type: String,
    /// Model that produced the image.
    pub model: String,
    /// Wall-clock time of the request.
    pub duration: Duration,
}

impl EditedImage {
    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns the recognised format, if the content type is one we know.
    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::from_mime_type(&self.mime_type)
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Returns the image as a displayable data URI.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    /// Saves the image to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
    const WEBP_MAGIC: [u8; 12] = *b"RIFF\x00\x00\x00\x00WEBP";

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&PNG_MAGIC),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&JPEG_MAGIC),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&WEBP_MAGIC),
            Some(ImageFormat::WebP)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"GIF89a"), None);
    }

    #[test]
    fn test_format_from_mime_type() {
        assert_eq!(
            ImageFormat::from_mime_type("IMAGE/PNG"),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::from_mime_type("image/gif"), None);
    }

    #[test]
    fn test_upload_detects_format() {
        let upload = UploadedImage::from_bytes(JPEG_MAGIC.to_vec(), "cat.png").unwrap();
        assert_eq!(upload.format, ImageFormat::Jpeg);
        assert_eq!(upload.mime_type(), "image/jpeg");
    }

    #[test]
    fn test_upload_falls_back_to_extension() {
        let upload = UploadedImage::from_bytes(vec![1, 2, 3], "shot.webp").unwrap();
        assert_eq!(upload.format, ImageFormat::WebP);
    }

    #[test]
    fn test_upload_rejects_unknown_and_empty() {
        let err = UploadedImage::from_bytes(b"GIF89a....".to_vec(), "anim.gif").unwrap_err();
        assert!(matches!(err, EditError::UnsupportedImage(_)));

        let err = UploadedImage::from_bytes(Vec::new(), "empty.png").unwrap_err();
        assert!(matches!(err, EditError::UnsupportedImage(_)));
    }

    #[test]
    fn test_request_validation() {
        assert!(EditRequest::new(PNG_MAGIC.to_vec(), "image/png", "Add a hat")
            .validate()
            .is_ok());

        let err = EditRequest::new(Vec::<u8>::new(), "image/png", "Add a hat")
            .validate()
            .unwrap_err();
        assert!(matches!(err, EditError::InvalidRequest(_)));

        let err = EditRequest::new(PNG_MAGIC.to_vec(), "image/png", " \t\n")
            .validate()
            .unwrap_err();
        assert!(matches!(err, EditError::InvalidRequest(_)));
    }

    #[test]
    fn test_edited_image_data_uri() {
        let image = EditedImage {
            data: vec![0x89, 0x50, 0x4E, 0x47],
            mime_type: "image/png".into(),
            model: "gemini-2.5-flash-image".into(),
            duration: Duration::from_millis(10),
        };
        assert_eq!(image.data_uri(), "data:image/png;base64,iVBORw==");
        assert_eq!(image.format(), Some(ImageFormat::Png));
    }
}
