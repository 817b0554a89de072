//! Uploaded and generated media
//!
//! Media lives in memory as a base64 payload for the duration of one
//! composition. [`MediaSelection`] enforces the carousel intake rules.

use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{PagecastError, Result};
use crate::types::{MediaKind, PostKind};

/// Largest number of images accepted in one carousel
pub const MAX_CAROUSEL_ITEMS: usize = 10;

/// Bounding box for history thumbnails
const THUMBNAIL_MAX: u32 = 128;

/// One image or video held for the current composition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadedMedia {
    /// Base64 payload without any data-URL prefix
    pub data: String,
    pub mime_type: String,
    pub kind: MediaKind,
    pub file_name: Option<String>,
}

impl UploadedMedia {
    /// Wrap raw bytes
    pub fn from_bytes(bytes: &[u8], mime_type: &str, file_name: Option<String>) -> Result<Self> {
        let kind = MediaKind::from_mime(mime_type).ok_or_else(|| {
            PagecastError::InvalidInput(format!("Unsupported media type: {}", mime_type))
        })?;
        Ok(Self {
            data: STANDARD.encode(bytes),
            mime_type: mime_type.to_lowercase(),
            kind,
            file_name,
        })
    }

    /// Wrap an already base64-encoded payload
    pub fn from_base64(data: String, mime_type: &str) -> Result<Self> {
        let kind = MediaKind::from_mime(mime_type).ok_or_else(|| {
            PagecastError::InvalidInput(format!("Unsupported media type: {}", mime_type))
        })?;
        Ok(Self {
            data,
            mime_type: mime_type.to_lowercase(),
            kind,
            file_name: None,
        })
    }

    /// Read a file from disk, choosing the MIME type from its extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let mime = mime_from_extension(ext).ok_or_else(|| {
            PagecastError::InvalidInput(format!(
                "Unsupported file type '{}': expected jpg, png, gif, webp, mp4, mov or webm",
                path.display()
            ))
        })?;

        let bytes = std::fs::read(path).map_err(|e| {
            PagecastError::InvalidInput(format!("Could not read {}: {}", path.display(), e))
        })?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);

        Self::from_bytes(&bytes, mime, file_name)
    }

    /// Decoded payload
    pub fn bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| PagecastError::InvalidInput(format!("Media payload is not valid base64: {}", e)))
    }

    /// File name to send with a multipart upload
    pub fn upload_name(&self) -> String {
        match &self.file_name {
            Some(name) => name.clone(),
            None => match self.kind {
                MediaKind::Video => "video.mp4".to_string(),
                MediaKind::Image => format!("image.{}", extension_for_mime(&self.mime_type)),
            },
        }
    }

    /// JPEG thumbnail (longest side 128px) as a data URL
    ///
    /// Returns `None` for video or for images the decoder cannot read; the
    /// history entry simply has no preview in that case.
    pub fn thumbnail(&self) -> Option<String> {
        if self.kind != MediaKind::Image {
            return None;
        }
        let bytes = self.bytes().ok()?;
        let image = match image::load_from_memory(&bytes) {
            Ok(image) => image,
            Err(e) => {
                tracing::debug!("Skipping thumbnail, image could not be decoded: {}", e);
                return None;
            }
        };

        let thumb = image.thumbnail(THUMBNAIL_MAX, THUMBNAIL_MAX).to_rgb8();
        let mut out = Cursor::new(Vec::new());
        thumb
            .write_to(&mut out, image::ImageFormat::Jpeg)
            .ok()?;

        Some(format!("data:image/jpeg;base64,{}", STANDARD.encode(out.into_inner())))
    }
}

/// Map a file extension to a MIME type
pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "mp4" => Some("video/mp4"),
        "mov" => Some("video/quicktime"),
        "webm" => Some("video/webm"),
        _ => None,
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Media chosen for the post being composed
///
/// In carousel mode only images are accepted, up to [`MAX_CAROUSEL_ITEMS`].
/// Items past the cap are rejected; nothing already selected is replaced.
#[derive(Debug, Clone, Default)]
pub struct MediaSelection {
    carousel: bool,
    items: Vec<UploadedMedia>,
}

impl MediaSelection {
    pub fn single() -> Self {
        Self {
            carousel: false,
            items: Vec::new(),
        }
    }

    pub fn carousel() -> Self {
        Self {
            carousel: true,
            items: Vec::new(),
        }
    }

    /// Add an item
    ///
    /// Outside carousel mode the new item replaces the current one wholesale.
    pub fn add(&mut self, media: UploadedMedia) -> Result<()> {
        if !self.carousel {
            self.items = vec![media];
            return Ok(());
        }

        if media.kind != MediaKind::Image {
            return Err(PagecastError::InvalidInput(format!(
                "Carousel posts accept images only; '{}' was skipped",
                media.upload_name()
            )));
        }
        if self.items.len() >= MAX_CAROUSEL_ITEMS {
            return Err(PagecastError::InvalidInput(format!(
                "A carousel holds at most {} images",
                MAX_CAROUSEL_ITEMS
            )));
        }
        self.items.push(media);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<UploadedMedia> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn items(&self) -> &[UploadedMedia] {
        &self.items
    }

    pub fn into_items(self) -> Vec<UploadedMedia> {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn post_kind(&self) -> Option<PostKind> {
        post_kind_of(&self.items)
    }
}

/// Classify a media list as image, video or carousel
pub fn post_kind_of(items: &[UploadedMedia]) -> Option<PostKind> {
    match items {
        [] => None,
        [single] => Some(match single.kind {
            MediaKind::Image => PostKind::Image,
            MediaKind::Video => PostKind::Video,
        }),
        _ => Some(PostKind::Carousel),
    }
}
