//! Service layer for Pagecast
//!
//! `PagecastService` is the entry point the command line tools use. It owns
//! the shared store, event bus and Graph API client and hands out the
//! specialised services:
//!
//! - `PublishService`: Facebook publish with optional Instagram cross-post
//! - `Scheduler`: in-process timers for deferred publishes
//! - `HistoryService`: the capped post history log
//! - `GenerationService` / `ChatSession`: Gemini-backed content generation
//! - `TemplateService` / `Preferences`: persisted user settings
//! - `ConnectionService`: page and Instagram account checks
//!
//! # Example
//!
//! ```no_run
//! use libpagecast::media::UploadedMedia;
//! use libpagecast::service::{PagecastService, Submission, Submitted};
//!
//! # async fn example() -> libpagecast::Result<()> {
//! let service = PagecastService::new().await?;
//!
//! let media = UploadedMedia::from_file(std::path::Path::new("soap.jpg"))?;
//! let submission = Submission::new(vec![media]).with_caption("Lavender soap is back!");
//!
//! match service.submit(submission).await? {
//!     Submitted::Published { outcome, .. } => println!("{}", outcome.summary()),
//!     Submitted::Deferred { pending, .. } => {
//!         pending.wait().await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod connection;
pub mod events;
pub mod generation;
pub mod history;
pub mod preferences;
pub mod publish;
pub mod scheduling;
pub mod templates;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tracing::{info, warn};

use self::chat::ChatSession;
use self::connection::ConnectionService;
use self::events::{EventBus, EventReceiver};
use self::generation::GenerationService;
use self::history::HistoryService;
use self::preferences::Preferences;
use self::publish::{PublishOutcome, PublishRequest, PublishRoute, PublishService};
use self::scheduling::{ScheduledPublish, Scheduler};
use self::templates::TemplateService;
use crate::config::Config;
use crate::error::{PagecastError, Result, StoreError};
use crate::media::{post_kind_of, UploadedMedia};
use crate::platforms::facebook::GraphClient;
use crate::platforms::gemini::GeminiClient;
use crate::platforms::{GenerativeApi, GraphApi};
use crate::store::Store;
use crate::types::{LogEntry, LogStatus, Privacy};

/// A post the user wants to publish
#[derive(Debug, Clone, Default)]
pub struct Submission {
    /// Caption to publish; falls back to the entry's caption
    pub caption: Option<String>,
    pub media: Vec<UploadedMedia>,
    /// History entry being published, if the caption was generated earlier
    pub entry_id: Option<String>,
    pub privacy: Privacy,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub cross_post_instagram: bool,
}

impl Submission {
    pub fn new(media: Vec<UploadedMedia>) -> Self {
        Self {
            media,
            ..Default::default()
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

/// Result of [`PagecastService::submit`]
#[derive(Debug)]
pub enum Submitted {
    /// Published now, or accepted by Facebook for native scheduling
    Published {
        entry: LogEntry,
        outcome: PublishOutcome,
    },
    /// Waiting on the local scheduler; the process must stay alive
    Deferred {
        entry: LogEntry,
        pending: ScheduledPublish,
    },
}

pub struct PagecastService {
    config: Arc<Config>,
    graph: Arc<dyn GraphApi>,
    history: HistoryService,
    publish: PublishService,
    scheduler: Scheduler,
    connection: ConnectionService,
    templates: TemplateService,
    preferences: Preferences,
    event_bus: EventBus,
}

impl PagecastService {
    /// Load the default configuration and open the store it names
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: Config) -> Result<Self> {
        let path = config.store_path();
        let path = path.to_str().ok_or_else(|| {
            StoreError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "store path is not valid UTF-8",
            ))
        })?;
        let store = Store::open(path).await?;
        let graph = Arc::new(GraphClient::new(&config.facebook));
        Self::with_parts(config, store, graph).await
    }

    /// Assemble from explicit parts (tests pass a mock Graph API here)
    pub async fn with_parts(config: Config, store: Store, graph: Arc<dyn GraphApi>) -> Result<Self> {
        let event_bus = EventBus::default();
        let history = HistoryService::load(store.clone()).await?;
        let publish = PublishService::new(
            Arc::clone(&graph),
            event_bus.clone(),
            config.publishing.container_poll(),
            config.publishing.upload_concurrency,
        );
        let scheduler = Scheduler::new(publish.clone(), history.clone(), event_bus.clone());

        Ok(Self {
            connection: ConnectionService::new(Arc::clone(&graph)),
            templates: TemplateService::new(store.clone()),
            preferences: Preferences::new(store),
            config: Arc::new(config),
            graph,
            history,
            publish,
            scheduler,
            event_bus,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn history(&self) -> &HistoryService {
        &self.history
    }

    pub fn publisher(&self) -> &PublishService {
        &self.publish
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn connection(&self) -> &ConnectionService {
        &self.connection
    }

    pub fn templates(&self) -> &TemplateService {
        &self.templates
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// Record a freshly generated caption as the active history entry
    pub async fn record_generated(&self, caption: &str, media: &[UploadedMedia]) -> Result<LogEntry> {
        let kind = post_kind_of(media).ok_or_else(|| {
            PagecastError::InvalidInput("Add at least one image or video".to_string())
        })?;
        let page_id = self.config.page_id()?;
        let thumbnail = media.first().and_then(UploadedMedia::thumbnail);
        self.history
            .record(LogEntry::new(caption.to_string(), thumbnail, kind, page_id))
            .await
    }

    /// Publish, natively schedule or defer a post and track it in the history
    ///
    /// Every check that does not need the network runs first, so an invalid
    /// submission makes no call and leaves the history untouched.
    pub async fn submit(&self, submission: Submission) -> Result<Submitted> {
        let existing = match &submission.entry_id {
            Some(id) => Some(self.history.require(id).await?),
            None => None,
        };
        let caption = submission
            .caption
            .clone()
            .or_else(|| existing.as_ref().map(|e| e.caption.clone()))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                PagecastError::InvalidInput("Write or generate a caption first".to_string())
            })?;

        let mut request = PublishRequest {
            caption: caption.clone(),
            media: submission.media,
            page_id: self.config.page_id()?,
            user_token: self.config.require_user_token()?,
            privacy: submission.privacy,
            scheduled_at: submission.scheduled_at,
            cross_post_instagram: submission.cross_post_instagram,
            instagram_account_id: self.config.instagram.account_id.clone(),
        };
        let now = Utc::now();
        let kind = request.validate_content(now)?;

        if request.cross_post_instagram && request.instagram_account_id.is_none() {
            let account = self
                .connection
                .verify_instagram(&request.page_id, &request.user_token)
                .await?;
            request.instagram_account_id = Some(account.id);
        }
        request.validate(now)?;

        let entry = match existing {
            Some(entry) => {
                let entry = self.history.prepare_for_publish(&entry.id).await?;
                if entry.caption != caption {
                    self.history
                        .update(&entry.id, |e| {
                            e.caption = caption.clone();
                            Ok(())
                        })
                        .await?
                } else {
                    entry
                }
            }
            None => {
                let thumbnail = request.media.first().and_then(UploadedMedia::thumbnail);
                self.history
                    .record(LogEntry::new(caption, thumbnail, kind, request.page_id.clone()))
                    .await?
            }
        };

        if let (PublishRoute::Deferred, Some(at)) = (request.route(), request.scheduled_at) {
            let pending = self
                .scheduler
                .schedule(request, at, Some(entry.id.clone()))
                .await?;
            let entry = self.history.require(&entry.id).await?;
            return Ok(Submitted::Deferred { entry, pending });
        }

        let outcome = match self.publish.publish(&request, Some(&entry.id)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(mark) = self.history.mark_failed(&entry.id).await {
                    warn!("Could not mark {} as failed: {}", entry.id, mark);
                }
                return Err(e);
            }
        };

        let entry = match outcome.scheduled_at {
            Some(at) => {
                self.history
                    .mark_natively_scheduled(&entry.id, at, &outcome.facebook_post_id)
                    .await?
            }
            None => {
                self.history
                    .mark_posted(
                        &entry.id,
                        &outcome.facebook_post_id,
                        outcome.instagram_media_id(),
                        outcome.privacy,
                        None,
                    )
                    .await?
            }
        };
        info!(entry = %entry.id, "{}", outcome.summary());
        Ok(Submitted::Published { entry, outcome })
    }

    /// Make an unpublished post from the history visible on the page feed
    pub async fn publish_now(&self, entry_id: &str) -> Result<LogEntry> {
        let entry = self.history.require(entry_id).await?;
        if entry.status != LogStatus::Posted || entry.privacy != Some(Privacy::Unpublished) {
            return Err(PagecastError::InvalidInput(format!(
                "Post {} is not an unpublished post",
                entry.id
            )));
        }
        let post_id = entry.facebook_post_id.clone().ok_or_else(|| {
            PagecastError::InvalidInput(format!("Post {} has no Facebook post id", entry.id))
        })?;
        let token = self.config.require_user_token()?;

        self.publish
            .republish(&entry.page_id, &token, &post_id)
            .await?;
        self.history.mark_republished(&entry.id).await
    }

    /// Verify a Google AI key and remember it
    pub async fn verify_gemini_key(&self, key: SecretString) -> Result<GeminiClient> {
        let client = GeminiClient::verify(&self.config.gemini, key).await?;
        self.preferences.set_api_key(client.api_key()).await?;
        Ok(client)
    }

    /// Verified client using the configured key, or the one saved earlier
    pub async fn gemini(&self) -> Result<GeminiClient> {
        let key = match self.config.gemini_api_key() {
            Some(key) => key,
            None => self.preferences.api_key().await?.ok_or_else(|| {
                PagecastError::InvalidInput(
                    "Connect a Google AI API key first (page-gen verify-key)".to_string(),
                )
            })?,
        };
        GeminiClient::verify(&self.config.gemini, key).await
    }

    pub fn generation(&self, api: Arc<dyn GenerativeApi>) -> GenerationService {
        GenerationService::new(
            api,
            self.config.gemini.clone(),
            self.config.generation.clone(),
            self.event_bus.clone(),
        )
    }

    pub fn chat(&self, api: Arc<dyn GenerativeApi>) -> ChatSession {
        ChatSession::new(api, self.config.gemini.text_model.clone())
    }

    /// Graph API client shared by the services
    pub fn graph(&self) -> Arc<dyn GraphApi> {
        Arc::clone(&self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{GraphCall, MockGraph};
    use crate::platforms::Visibility;
    use crate::types::PostKind;
    use chrono::Duration;

    fn config() -> Config {
        let mut config = Config::default();
        config.facebook.page_id = Some("111".to_string());
        config.facebook.user_token = Some("user-token".to_string());
        config.publishing.container_poll_interval_secs = 0;
        config
    }

    async fn service_with(graph: Arc<MockGraph>, config: Config) -> PagecastService {
        PagecastService::with_parts(config, Store::in_memory().await.unwrap(), graph)
            .await
            .unwrap()
    }

    fn image() -> UploadedMedia {
        UploadedMedia::from_bytes(b"img", "image/jpeg", None).unwrap()
    }

    #[tokio::test]
    async fn test_submit_records_and_marks_posted() {
        let graph = Arc::new(MockGraph::new());
        let service = service_with(graph.clone(), config()).await;

        let submitted = service
            .submit(Submission::new(vec![image()]).with_caption("Hello"))
            .await
            .unwrap();
        let Submitted::Published { entry, outcome } = submitted else {
            panic!("expected an immediate publish");
        };
        assert_eq!(entry.status, LogStatus::Posted);
        assert_eq!(entry.facebook_post_id.as_deref(), Some(outcome.facebook_post_id.as_str()));
        assert_eq!(entry.media_kind, PostKind::Image);
        assert_eq!(service.history().len().await, 1);
    }

    #[tokio::test]
    async fn test_submit_generated_entry_uses_its_caption() {
        let graph = Arc::new(MockGraph::new());
        let service = service_with(graph.clone(), config()).await;
        let generated = service.record_generated("From the model", &[image()]).await.unwrap();

        let mut submission = Submission::new(vec![image()]);
        submission.entry_id = Some(generated.id.clone());
        let Submitted::Published { entry, .. } = service.submit(submission).await.unwrap() else {
            panic!("expected an immediate publish");
        };
        assert_eq!(entry.id, generated.id);
        assert!(graph.calls().contains(&GraphCall::UploadPhoto {
            caption: Some("From the model".to_string()),
            visibility: Visibility::Published,
        }));
    }

    #[tokio::test]
    async fn test_invalid_submission_leaves_no_trace() {
        let graph = Arc::new(MockGraph::new());
        let service = service_with(graph.clone(), config()).await;

        let mut past = Submission::new(vec![image()]).with_caption("late");
        past.scheduled_at = Some(Utc::now() - Duration::minutes(1));
        assert_eq!(service.submit(past).await.unwrap_err().exit_code(), 3);

        let mut unpublished_ig = Submission::new(vec![image()]).with_caption("hidden");
        unpublished_ig.privacy = Privacy::Unpublished;
        unpublished_ig.cross_post_instagram = true;
        assert_eq!(service.submit(unpublished_ig).await.unwrap_err().exit_code(), 3);

        assert_eq!(graph.call_count(), 0);
        assert!(service.history().is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_page_id_is_invalid_input() {
        let graph = Arc::new(MockGraph::new());
        let mut config = config();
        config.facebook.page_id = None;
        let service = service_with(graph.clone(), config).await;

        let err = service
            .submit(Submission::new(vec![image()]).with_caption("x"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(graph.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_publish_marks_entry_failed() {
        let graph = Arc::new(MockGraph::new().failing(
            "page_token",
            crate::error::ApiError::Credential {
                provider: crate::error::Provider::Graph,
                message: "expired".into(),
            },
        ));
        let service = service_with(graph, config()).await;

        let err = service
            .submit(Submission::new(vec![image()]).with_caption("x"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let entries = service.history().list(None).await;
        assert_eq!(entries[0].status, LogStatus::Failed);
    }

    #[tokio::test]
    async fn test_native_schedule_is_recorded_as_scheduled() {
        let graph = Arc::new(MockGraph::new());
        let service = service_with(graph, config()).await;
        let at = Utc::now() + Duration::hours(5);

        let mut submission = Submission::new(vec![image()]).with_caption("later");
        submission.scheduled_at = Some(at);
        let Submitted::Published { entry, .. } = service.submit(submission).await.unwrap() else {
            panic!("facebook-only schedules are native");
        };
        assert_eq!(entry.status, LogStatus::Scheduled);
        assert_eq!(entry.scheduled_at, Some(at));
        assert!(entry.facebook_post_id.is_some());
    }

    #[tokio::test]
    async fn test_instagram_account_looked_up_when_not_configured() {
        let graph = Arc::new(MockGraph::new());
        let service = service_with(graph.clone(), config()).await;

        let mut submission = Submission::new(vec![image()]).with_caption("both");
        submission.cross_post_instagram = true;
        let Submitted::Published { outcome, .. } = service.submit(submission).await.unwrap() else {
            panic!("expected an immediate publish");
        };
        assert!(outcome.instagram_media_id().is_some());
        assert_eq!(graph.count("instagram_account"), 1);
        let published = graph
            .calls()
            .into_iter()
            .find_map(|call| match call {
                GraphCall::PublishContainer { instagram_id, .. } => Some(instagram_id),
                _ => None,
            });
        assert_eq!(published.as_deref(), Some("ig_mock"));
    }

    #[tokio::test]
    async fn test_deferred_submission_returns_handle() {
        let graph = Arc::new(MockGraph::new());
        let mut config = config();
        config.instagram.account_id = Some("ig_configured".to_string());
        let service = service_with(graph.clone(), config).await;

        let mut submission = Submission::new(vec![image()]).with_caption("soon");
        submission.cross_post_instagram = true;
        submission.scheduled_at = Some(Utc::now() + Duration::milliseconds(250));

        let Submitted::Deferred { entry, pending } = service.submit(submission).await.unwrap() else {
            panic!("instagram schedules are deferred");
        };
        assert_eq!(entry.status, LogStatus::Scheduled);
        assert_eq!(graph.call_count(), 0);

        pending.wait().await.unwrap();
        let entry = service.history().require(&entry.id).await.unwrap();
        assert_eq!(entry.status, LogStatus::Posted);
        assert_eq!(graph.count("instagram_account"), 0);
    }

    #[tokio::test]
    async fn test_publish_now_flow() {
        let graph = Arc::new(MockGraph::new());
        let service = service_with(graph.clone(), config()).await;

        let mut submission = Submission::new(vec![image()]).with_caption("quiet");
        submission.privacy = Privacy::Unpublished;
        let Submitted::Published { entry, .. } = service.submit(submission).await.unwrap() else {
            panic!("expected an immediate publish");
        };
        assert_eq!(entry.privacy, Some(Privacy::Unpublished));

        let updated = service.publish_now(&entry.id).await.unwrap();
        assert_eq!(updated.privacy, Some(Privacy::Published));
        assert_eq!(graph.count("republish"), 1);

        assert!(service.publish_now(&entry.id).await.is_err());
        assert_eq!(graph.count("republish"), 1);
    }
}
