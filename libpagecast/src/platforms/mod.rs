//! External API seams
//!
//! [`GraphApi`] covers the Facebook Graph endpoints (Pages and the Instagram
//! publishing endpoints hosted on the same API). [`GenerativeApi`] covers the
//! Google Generative Language endpoints. Both are thin: each method is one
//! HTTP request, and failures are already classified into
//! [`crate::error::ApiError`] when they come back. Workflow logic (ordering,
//! polling, validation) lives in [`crate::service`].
//!
//! The mock implementations in [`mock`] script responses and record calls so
//! the orchestration can be tested without network access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::media::UploadedMedia;
use crate::types::MediaKind;

pub mod facebook;
pub mod gemini;

// Available outside cfg(test) so integration tests and downstream crates can use it
pub mod mock;

pub use gemini::{
    Candidate, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    ImageInstance, ImageParameters, ImagePredictRequest, ImagePredictResponse, ImagePrediction,
    InlineData, Part, PromptFeedback, SeedImage, ThinkingConfig, VideoInstance, VideoOperation,
    VideoParameters, VideoRequest,
};

/// Feed visibility fields attached to a photo, video or feed post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Published,
    /// Hidden from the feed until published later
    Unpublished,
    /// Published by Facebook at the given time
    Scheduled(DateTime<Utc>),
    /// Carousel attachment upload, never shown on its own
    Attachment,
}

impl Visibility {
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Visibility::Published => vec![("published", "true".to_string())],
            Visibility::Unpublished => vec![
                ("published", "false".to_string()),
                ("unpublished_content_type", "SCHEDULED".to_string()),
            ],
            Visibility::Scheduled(at) => vec![
                ("published", "false".to_string()),
                ("scheduled_publish_time", at.timestamp().to_string()),
            ],
            Visibility::Attachment => vec![("published", "false".to_string())],
        }
    }
}

/// Object created by a photo or video upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphObject {
    /// Photo or video id
    pub id: String,
    /// Feed post id, when the upload also created a post
    #[serde(default)]
    pub post_id: Option<String>,
}

impl GraphObject {
    /// Id to record as the Facebook post
    pub fn post_ref(&self) -> &str {
        self.post_id.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstagramAccount {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Instagram media container to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerSpec {
    Image { image_url: String, caption: String },
    Reel { video_url: String, caption: String },
    CarouselItem { image_url: String },
    Carousel { children: Vec<String>, caption: String },
}

impl ContainerSpec {
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            ContainerSpec::Image { image_url, caption } => vec![
                ("image_url", image_url.clone()),
                ("caption", caption.clone()),
            ],
            ContainerSpec::Reel { video_url, caption } => vec![
                ("media_type", "REELS".to_string()),
                ("video_url", video_url.clone()),
                ("caption", caption.clone()),
            ],
            ContainerSpec::CarouselItem { image_url } => vec![
                ("image_url", image_url.clone()),
                ("is_carousel_item", "true".to_string()),
            ],
            ContainerSpec::Carousel { children, caption } => vec![
                ("media_type", "CAROUSEL".to_string()),
                ("children", children.join(",")),
                ("caption", caption.clone()),
            ],
        }
    }
}

/// Processing state reported by `?fields=status_code`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    Finished,
    InProgress,
    Error,
    Expired,
    Published,
    Other(String),
}

impl ContainerStatus {
    pub fn parse(code: &str) -> Self {
        match code {
            "FINISHED" => ContainerStatus::Finished,
            "IN_PROGRESS" => ContainerStatus::InProgress,
            "ERROR" => ContainerStatus::Error,
            "EXPIRED" => ContainerStatus::Expired,
            "PUBLISHED" => ContainerStatus::Published,
            other => ContainerStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContainerStatus::Finished => "FINISHED",
            ContainerStatus::InProgress => "IN_PROGRESS",
            ContainerStatus::Error => "ERROR",
            ContainerStatus::Expired => "EXPIRED",
            ContainerStatus::Published => "PUBLISHED",
            ContainerStatus::Other(s) => s,
        }
    }

    /// Processing has stopped without producing publishable media
    pub fn is_failure(&self) -> bool {
        matches!(self, ContainerStatus::Error | ContainerStatus::Expired)
    }
}

/// Facebook Graph API operations used by the publish workflow
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// Exchange a user token for the page-scoped token
    async fn page_token(&self, page_id: &str, user_token: &SecretString) -> Result<SecretString>;

    async fn page_name(&self, page_id: &str, user_token: &SecretString) -> Result<String>;

    /// Business account linked to the page, if any
    async fn instagram_account(
        &self,
        page_id: &str,
        user_token: &SecretString,
    ) -> Result<Option<InstagramAccount>>;

    async fn upload_photo(
        &self,
        page_id: &str,
        page_token: &SecretString,
        media: &UploadedMedia,
        caption: Option<&str>,
        visibility: Visibility,
    ) -> Result<GraphObject>;

    async fn upload_video(
        &self,
        page_id: &str,
        page_token: &SecretString,
        media: &UploadedMedia,
        description: &str,
        visibility: Visibility,
    ) -> Result<GraphObject>;

    /// Feed post referencing already-uploaded photos
    async fn create_feed_post(
        &self,
        page_id: &str,
        page_token: &SecretString,
        message: &str,
        attachment_ids: &[String],
        visibility: Visibility,
    ) -> Result<String>;

    /// Publicly fetchable URL of an uploaded photo or video
    async fn media_url(
        &self,
        media_id: &str,
        kind: MediaKind,
        page_token: &SecretString,
    ) -> Result<String>;

    async fn create_container(
        &self,
        instagram_id: &str,
        page_token: &SecretString,
        spec: &ContainerSpec,
    ) -> Result<String>;

    async fn container_status(
        &self,
        container_id: &str,
        page_token: &SecretString,
    ) -> Result<ContainerStatus>;

    /// Publish a finished container, returning the Instagram media id
    async fn publish_container(
        &self,
        instagram_id: &str,
        page_token: &SecretString,
        creation_id: &str,
    ) -> Result<String>;

    /// Flip an unpublished post to published
    async fn republish(&self, post_id: &str, page_token: &SecretString) -> Result<()>;
}

/// Generative Language API operations
#[async_trait]
pub trait GenerativeApi: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;

    async fn predict_image(
        &self,
        model: &str,
        request: &ImagePredictRequest,
    ) -> Result<ImagePredictResponse>;

    /// Submit a long-running video job
    async fn start_video(&self, model: &str, request: &VideoRequest) -> Result<VideoOperation>;

    /// Refresh a long-running operation by name
    async fn video_operation(&self, name: &str) -> Result<VideoOperation>;

    /// Fetch generated bytes from a result URI
    async fn download(&self, uri: &str) -> Result<Vec<u8>>;
}
