//! Progress events
//!
//! An in-process broadcast bus. Services emit while they work; the CLIs
//! subscribe and print progress to stderr. With no subscribers, events are
//! dropped without blocking the emitter.
//!
//! ```no_run
//! use libpagecast::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Event::GenerationProgress {
//!     task: "video".to_string(),
//!     message: "Submitting video request".to_string(),
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{}", event.describe());
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer; lagging subscribers lose the
    /// oldest events first
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A publish began; `platforms` lists the legs that will run
    PublishStarted {
        log_id: Option<String>,
        platforms: Vec<String>,
    },

    /// Step within one platform leg (token exchange, upload, container poll)
    PublishProgress {
        log_id: Option<String>,
        platform: String,
        status: String,
    },

    PublishCompleted {
        log_id: Option<String>,
        facebook_post_id: String,
        instagram_media_id: Option<String>,
        /// Set when the Facebook post went out but Instagram did not
        instagram_error: Option<String>,
    },

    PublishFailed {
        log_id: Option<String>,
        error: String,
    },

    /// A deferred publish was registered with the local scheduler
    ScheduleRegistered { log_id: Option<String>, at: DateTime<Utc> },

    ScheduleCancelled { log_id: Option<String> },

    /// Human-readable status from a long-running generation job
    GenerationProgress { task: String, message: String },
}

impl Event {
    /// One-line rendering for progress output
    pub fn describe(&self) -> String {
        match self {
            Event::PublishStarted { platforms, .. } => {
                format!("Publishing to {}", platforms.join(" and "))
            }
            Event::PublishProgress {
                platform, status, ..
            } => format!("[{}] {}", platform, status),
            Event::PublishCompleted {
                facebook_post_id,
                instagram_media_id,
                instagram_error,
                ..
            } => match (instagram_media_id, instagram_error) {
                (Some(ig), _) => format!("Posted to Facebook ({}) and Instagram ({})", facebook_post_id, ig),
                (None, Some(error)) => format!(
                    "Posted to Facebook ({}), but Instagram failed: {}",
                    facebook_post_id, error
                ),
                (None, None) => format!("Posted to Facebook ({})", facebook_post_id),
            },
            Event::PublishFailed { error, .. } => format!("Publish failed: {}", error),
            Event::ScheduleRegistered { at, .. } => format!("Scheduled for {}", at.to_rfc3339()),
            Event::ScheduleCancelled { .. } => "Scheduled publish cancelled".to_string(),
            Event::GenerationProgress { task, message } => format!("[{}] {}", task, message),
        }
    }
}
