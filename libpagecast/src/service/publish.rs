//! Facebook publish workflow with optional Instagram cross-post
//!
//! The Facebook leg runs first and must succeed. The Instagram leg runs only
//! when requested; its failure is reported in the outcome and never undoes
//! the Facebook post.

use chrono::{DateTime, Utc};
use futures::future::{try_join_all, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use secrecy::SecretString;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::PollPolicy;
use crate::error::{ContainerError, PagecastError, Result};
use crate::media::{post_kind_of, UploadedMedia, MAX_CAROUSEL_ITEMS};
use crate::platforms::{ContainerSpec, ContainerStatus, GraphApi, Visibility};
use crate::service::events::{Event, EventBus};
use crate::translate::translate;
use crate::types::{MediaKind, PostKind, Privacy};

pub const INSTAGRAM_UNPUBLISHED_MESSAGE: &str = "Instagram does not support unpublished posts. \
Schedule the post instead, or turn off Instagram cross-posting";

const FACEBOOK: &str = "facebook";
const INSTAGRAM: &str = "instagram";

/// Everything needed to publish one post
pub struct PublishRequest {
    pub caption: String,
    pub media: Vec<UploadedMedia>,
    pub page_id: String,
    pub user_token: SecretString,
    pub privacy: Privacy,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub cross_post_instagram: bool,
    pub instagram_account_id: Option<String>,
}

/// How a validated request gets executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishRoute {
    Immediate,
    /// Facebook holds the post and publishes it at `scheduled_at`
    NativeSchedule,
    /// The local scheduler waits and then publishes immediately
    Deferred,
}

impl PublishRequest {
    /// Check the request before any network call
    pub fn validate(&self, now: DateTime<Utc>) -> Result<PostKind> {
        let kind = self.validate_content(now)?;
        if self.cross_post_instagram
            && self
                .instagram_account_id
                .as_deref()
                .map_or(true, |id| id.trim().is_empty())
        {
            return Err(PagecastError::InvalidInput(
                "Instagram cross-posting needs a connected Instagram business account".to_string(),
            ));
        }
        Ok(kind)
    }

    /// Every check except the Instagram account, which may still need a lookup
    pub fn validate_content(&self, now: DateTime<Utc>) -> Result<PostKind> {
        let kind = post_kind_of(&self.media)
            .ok_or_else(|| PagecastError::InvalidInput("Add at least one image or video".to_string()))?;

        if kind == PostKind::Carousel {
            if self.media.iter().any(|m| m.kind != MediaKind::Image) {
                return Err(PagecastError::InvalidInput(
                    "Carousel posts accept images only".to_string(),
                ));
            }
            if self.media.len() > MAX_CAROUSEL_ITEMS {
                return Err(PagecastError::InvalidInput(format!(
                    "A carousel holds at most {} images",
                    MAX_CAROUSEL_ITEMS
                )));
            }
        }

        if self.page_id.trim().is_empty() {
            return Err(PagecastError::InvalidInput("Enter a Facebook Page ID".to_string()));
        }

        if let Some(at) = self.scheduled_at {
            if at <= now {
                return Err(PagecastError::InvalidInput(
                    "Schedule time must be in the future".to_string(),
                ));
            }
        }

        if self.cross_post_instagram
            && self.privacy == Privacy::Unpublished
            && self.scheduled_at.is_none()
        {
            return Err(PagecastError::InvalidInput(
                INSTAGRAM_UNPUBLISHED_MESSAGE.to_string(),
            ));
        }

        Ok(kind)
    }

    pub fn route(&self) -> PublishRoute {
        match (self.scheduled_at, self.cross_post_instagram) {
            (None, _) => PublishRoute::Immediate,
            (Some(_), false) => PublishRoute::NativeSchedule,
            (Some(_), true) => PublishRoute::Deferred,
        }
    }

    /// Same post, to be published right now and visibly
    pub fn into_immediate(mut self) -> Self {
        self.scheduled_at = None;
        self.privacy = Privacy::Published;
        self
    }

    fn visibility(&self) -> Visibility {
        match (self.scheduled_at, self.privacy) {
            (Some(at), _) => Visibility::Scheduled(at),
            (None, Privacy::Unpublished) => Visibility::Unpublished,
            (None, Privacy::Published) => Visibility::Published,
        }
    }

    fn platforms(&self) -> Vec<String> {
        let mut platforms = vec![FACEBOOK.to_string()];
        if self.cross_post_instagram {
            platforms.push(INSTAGRAM.to_string());
        }
        platforms
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstagramOutcome {
    NotRequested,
    Published { media_id: String },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub kind: PostKind,
    pub facebook_post_id: String,
    pub privacy: Privacy,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub instagram: InstagramOutcome,
}

impl PublishOutcome {
    pub fn instagram_media_id(&self) -> Option<&str> {
        match &self.instagram {
            InstagramOutcome::Published { media_id } => Some(media_id),
            _ => None,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.instagram, InstagramOutcome::Failed { .. })
    }

    /// One-line result for the user
    pub fn summary(&self) -> String {
        let facebook = match (self.scheduled_at, self.privacy) {
            (Some(at), _) => format!("Scheduled on Facebook for {}", at.to_rfc3339()),
            (None, Privacy::Unpublished) => "Created an unpublished Facebook post".to_string(),
            (None, Privacy::Published) => "Posted to Facebook".to_string(),
        };
        match &self.instagram {
            InstagramOutcome::NotRequested => format!("{} ({})", facebook, self.facebook_post_id),
            InstagramOutcome::Published { media_id } => format!(
                "{} ({}) and Instagram ({})",
                facebook, self.facebook_post_id, media_id
            ),
            InstagramOutcome::Failed { message } => {
                format!("{}, but Instagram failed: {}", facebook, message)
            }
        }
    }
}

/// Result of the Facebook leg, with the media the Instagram leg can reuse
struct FacebookResult {
    post_id: String,
    media_ids: Vec<String>,
    page_token: SecretString,
}

#[derive(Clone)]
pub struct PublishService {
    graph: Arc<dyn GraphApi>,
    events: EventBus,
    container_poll: PollPolicy,
    upload_concurrency: usize,
}

impl PublishService {
    pub fn new(
        graph: Arc<dyn GraphApi>,
        events: EventBus,
        container_poll: PollPolicy,
        upload_concurrency: usize,
    ) -> Self {
        Self {
            graph,
            events,
            container_poll,
            upload_concurrency: upload_concurrency.max(1),
        }
    }

    fn progress(&self, log_id: Option<&str>, platform: &str, status: impl Into<String>) {
        self.events.emit(Event::PublishProgress {
            log_id: log_id.map(str::to_string),
            platform: platform.to_string(),
            status: status.into(),
        });
    }

    /// Publish now or with Facebook's native scheduling
    ///
    /// Requests that need the local scheduler are refused; see
    /// [`PublishRequest::route`].
    pub async fn publish(&self, request: &PublishRequest, log_id: Option<&str>) -> Result<PublishOutcome> {
        let kind = request.validate(Utc::now())?;
        if request.route() == PublishRoute::Deferred {
            return Err(PagecastError::InvalidInput(
                "Scheduled Instagram cross-posts must be registered with the scheduler".to_string(),
            ));
        }

        self.events.emit(Event::PublishStarted {
            log_id: log_id.map(str::to_string),
            platforms: request.platforms(),
        });

        let facebook = match self.facebook_leg(request, kind, log_id).await {
            Ok(result) => result,
            Err(e) => {
                self.events.emit(Event::PublishFailed {
                    log_id: log_id.map(str::to_string),
                    error: translate(&e),
                });
                return Err(e);
            }
        };
        info!(post_id = %facebook.post_id, "Facebook post created");

        let instagram = if request.cross_post_instagram {
            match self.instagram_leg(request, kind, &facebook, log_id).await {
                Ok(media_id) => {
                    info!(media_id = %media_id, "Instagram media published");
                    InstagramOutcome::Published { media_id }
                }
                Err(e) => {
                    warn!("Instagram cross-post failed: {}", e);
                    InstagramOutcome::Failed {
                        message: translate(&e),
                    }
                }
            }
        } else {
            InstagramOutcome::NotRequested
        };

        let outcome = PublishOutcome {
            kind,
            facebook_post_id: facebook.post_id,
            privacy: if request.scheduled_at.is_some() {
                Privacy::Published
            } else {
                request.privacy
            },
            scheduled_at: request.scheduled_at,
            instagram,
        };

        self.events.emit(Event::PublishCompleted {
            log_id: log_id.map(str::to_string),
            facebook_post_id: outcome.facebook_post_id.clone(),
            instagram_media_id: outcome.instagram_media_id().map(str::to_string),
            instagram_error: match &outcome.instagram {
                InstagramOutcome::Failed { message } => Some(message.clone()),
                _ => None,
            },
        });
        Ok(outcome)
    }

    async fn facebook_leg(
        &self,
        request: &PublishRequest,
        kind: PostKind,
        log_id: Option<&str>,
    ) -> Result<FacebookResult> {
        self.progress(log_id, FACEBOOK, "Exchanging page token");
        let token = self
            .graph
            .page_token(&request.page_id, &request.user_token)
            .await?;
        let visibility = request.visibility();

        match kind {
            PostKind::Image => {
                self.progress(log_id, FACEBOOK, "Uploading photo");
                let photo = self
                    .graph
                    .upload_photo(
                        &request.page_id,
                        &token,
                        &request.media[0],
                        Some(&request.caption),
                        visibility,
                    )
                    .await?;
                Ok(FacebookResult {
                    post_id: photo.post_ref().to_string(),
                    media_ids: vec![photo.id],
                    page_token: token,
                })
            }
            PostKind::Video => {
                self.progress(log_id, FACEBOOK, "Uploading video");
                let video = self
                    .graph
                    .upload_video(
                        &request.page_id,
                        &token,
                        &request.media[0],
                        &request.caption,
                        visibility,
                    )
                    .await?;
                Ok(FacebookResult {
                    post_id: video.post_ref().to_string(),
                    media_ids: vec![video.id],
                    page_token: token,
                })
            }
            PostKind::Carousel => {
                self.progress(
                    log_id,
                    FACEBOOK,
                    format!("Uploading {} photos", request.media.len()),
                );
                let attachment_ids = self
                    .upload_attachments(&request.page_id, &token, &request.media)
                    .await?;

                self.progress(log_id, FACEBOOK, "Creating carousel post");
                let post_id = self
                    .graph
                    .create_feed_post(
                        &request.page_id,
                        &token,
                        &request.caption,
                        &attachment_ids,
                        visibility,
                    )
                    .await?;
                Ok(FacebookResult {
                    post_id,
                    media_ids: attachment_ids,
                    page_token: token,
                })
            }
        }
    }

    /// Unpublished photo uploads, at most `upload_concurrency` in flight,
    /// returned in input order
    async fn upload_attachments(
        &self,
        page_id: &str,
        token: &SecretString,
        media: &[UploadedMedia],
    ) -> Result<Vec<String>> {
        stream::iter(media)
            .map(|item| async move {
                self.graph
                    .upload_photo(page_id, token, item, None, Visibility::Attachment)
                    .await
                    .map(|photo| photo.id)
            })
            .buffered(self.upload_concurrency)
            .try_collect::<Vec<String>>()
            .boxed()
            .await
    }

    async fn instagram_leg(
        &self,
        request: &PublishRequest,
        kind: PostKind,
        facebook: &FacebookResult,
        log_id: Option<&str>,
    ) -> Result<String> {
        let instagram_id = request.instagram_account_id.as_deref().ok_or_else(|| {
            PagecastError::InvalidInput("No Instagram business account connected".to_string())
        })?;

        let token = &facebook.page_token;

        let container_id = match kind {
            PostKind::Image | PostKind::Video => {
                let media_kind = if kind == PostKind::Video {
                    MediaKind::Video
                } else {
                    MediaKind::Image
                };
                self.progress(log_id, INSTAGRAM, "Fetching media URL");
                let url = self
                    .graph
                    .media_url(&facebook.media_ids[0], media_kind, token)
                    .await?;

                let spec = match media_kind {
                    MediaKind::Image => ContainerSpec::Image {
                        image_url: url,
                        caption: request.caption.clone(),
                    },
                    MediaKind::Video => ContainerSpec::Reel {
                        video_url: url,
                        caption: request.caption.clone(),
                    },
                };
                self.progress(log_id, INSTAGRAM, "Creating media container");
                self.graph.create_container(instagram_id, token, &spec).await?
            }
            PostKind::Carousel => {
                self.carousel_container(instagram_id, token, request, facebook, log_id)
                    .await?
            }
        };

        self.progress(log_id, INSTAGRAM, "Waiting for Instagram to process media");
        self.wait_for_container(&container_id, token).await?;

        self.progress(log_id, INSTAGRAM, "Publishing");
        self.graph
            .publish_container(instagram_id, token, &container_id)
            .await
    }

    /// Child containers are created and polled concurrently, then wrapped in
    /// one parent container
    async fn carousel_container(
        &self,
        instagram_id: &str,
        token: &SecretString,
        request: &PublishRequest,
        facebook: &FacebookResult,
        log_id: Option<&str>,
    ) -> Result<String> {
        self.progress(log_id, INSTAGRAM, "Fetching media URLs");
        let urls: Vec<String> = stream::iter(&facebook.media_ids)
            .map(|id| self.graph.media_url(id, MediaKind::Image, token))
            .buffered(self.upload_concurrency)
            .try_collect::<Vec<String>>()
            .boxed()
            .await?;

        self.progress(
            log_id,
            INSTAGRAM,
            format!("Creating {} carousel items", urls.len()),
        );
        let children = try_join_all(urls.into_iter().map(|image_url| async move {
            self.graph
                .create_container(instagram_id, token, &ContainerSpec::CarouselItem { image_url })
                .await
        }))
        .await?;

        try_join_all(children.iter().map(|child| self.wait_for_container(child, token))).await?;

        self.progress(log_id, INSTAGRAM, "Creating carousel container");
        self.graph
            .create_container(
                instagram_id,
                token,
                &ContainerSpec::Carousel {
                    children,
                    caption: request.caption.clone(),
                },
            )
            .await
    }

    /// Poll until `FINISHED`; stop at once on `ERROR`/`EXPIRED`
    pub async fn wait_for_container(&self, container_id: &str, token: &SecretString) -> Result<()> {
        let policy = self.container_poll;
        for attempt in 1..=policy.max_attempts {
            let status = self.graph.container_status(container_id, token).await?;
            match status {
                ContainerStatus::Finished => return Ok(()),
                status if status.is_failure() => {
                    return Err(ContainerError::Failed {
                        container_id: container_id.to_string(),
                        status: status.as_str().to_string(),
                    }
                    .into())
                }
                status => {
                    tracing::debug!(
                        container_id,
                        attempt,
                        status = status.as_str(),
                        "Container not ready"
                    );
                }
            }
            if attempt < policy.max_attempts {
                sleep(policy.interval).await;
            }
        }

        Err(ContainerError::Timeout {
            container_id: container_id.to_string(),
            attempts: policy.max_attempts,
        }
        .into())
    }

    /// Make an unpublished post visible
    pub async fn republish(&self, page_id: &str, user_token: &SecretString, post_id: &str) -> Result<()> {
        if post_id.trim().is_empty() {
            return Err(PagecastError::InvalidInput("No Facebook post id to publish".to_string()));
        }
        let token = self.graph.page_token(page_id, user_token).await?;
        self.graph.republish(post_id, &token).await
    }
}
