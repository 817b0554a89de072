//! Local scheduling
//!
//! A scheduled publish is a tokio task that sleeps until the target time and
//! then runs the normal publish path. It lives in process memory only:
//! exiting the process drops it. Anything that must survive a restart needs
//! an external job store.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{PagecastError, Result};
use crate::service::events::{Event, EventBus};
use crate::service::history::HistoryService;
use crate::service::publish::{PublishOutcome, PublishRequest, PublishService};

/// Time left until `at`
///
/// Fails unless `at` is strictly after `now`.
pub fn delay_until(at: DateTime<Utc>, now: DateTime<Utc>) -> Result<std::time::Duration> {
    if at <= now {
        return Err(PagecastError::InvalidInput(
            "Schedule time must be in the future".to_string(),
        ));
    }
    (at - now)
        .to_std()
        .map_err(|_| PagecastError::InvalidInput("Schedule time is out of range".to_string()))
}

/// Parse a schedule string into a UTC time
///
/// Accepts RFC 3339 (`2030-05-01T10:00:00+07:00`), local `YYYY-MM-DD HH:MM`,
/// relative durations (`30m`, `2h`, `1 hour`) and natural language
/// (`tomorrow`, `next monday 10am`).
pub fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PagecastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(at.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|at| at.with_timezone(&Utc))
            .ok_or_else(|| {
                PagecastError::InvalidInput(format!("{} does not exist in the local time zone", input))
            });
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        let duration = chrono::Duration::from_std(duration)
            .map_err(|_| PagecastError::InvalidInput("Duration out of range".to_string()))?;
        return Ok(Utc::now() + duration);
    }

    chrono_english::parse_date_string(input, Local::now(), chrono_english::Dialect::Us)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| {
            PagecastError::InvalidInput(format!("Could not parse schedule string: {}", input))
        })
}

/// Handle to one pending publish
#[derive(Debug)]
pub struct ScheduledPublish {
    log_id: Option<String>,
    at: DateTime<Utc>,
    token: CancellationToken,
    handle: JoinHandle<Result<Option<PublishOutcome>>>,
}

impl ScheduledPublish {
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn log_id(&self) -> Option<&str> {
        self.log_id.as_deref()
    }

    /// Stop the timer; a publish already under way is not interrupted
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that cancels this publish from another task
    pub fn canceller(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the task; `Ok(None)` means it was cancelled before firing
    pub async fn wait(self) -> Result<Option<PublishOutcome>> {
        self.handle
            .await
            .map_err(|e| PagecastError::Task(e.to_string()))?
    }
}

#[derive(Clone)]
pub struct Scheduler {
    publisher: PublishService,
    history: HistoryService,
    events: EventBus,
}

impl Scheduler {
    pub fn new(publisher: PublishService, history: HistoryService, events: EventBus) -> Self {
        Self {
            publisher,
            history,
            events,
        }
    }

    /// Register a publish of `request` at `at`
    ///
    /// Validation happens here, before anything is spawned. The history entry
    /// (if any) becomes `Scheduled` now and `Posted` or `Failed` when the
    /// timer fires.
    pub async fn schedule(
        &self,
        mut request: PublishRequest,
        at: DateTime<Utc>,
        log_id: Option<String>,
    ) -> Result<ScheduledPublish> {
        let now = Utc::now();
        let delay = delay_until(at, now)?;
        request.scheduled_at = Some(at);
        request.validate(now)?;
        let request = request.into_immediate();

        if let Some(id) = &log_id {
            self.history.mark_scheduled(id, at).await?;
        }
        self.events.emit(Event::ScheduleRegistered {
            log_id: log_id.clone(),
            at,
        });
        info!(at = %at.to_rfc3339(), "Publish scheduled locally");

        let token = CancellationToken::new();
        let task_token = token.clone();
        let scheduler = self.clone();
        let task_log_id = log_id.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {
                    scheduler.cancelled(task_log_id.as_deref()).await;
                    Ok(None)
                }
                _ = sleep(delay) => {
                    scheduler.fire(request, task_log_id.as_deref(), at).await.map(Some)
                }
            }
        });

        Ok(ScheduledPublish {
            log_id,
            at,
            token,
            handle,
        })
    }

    async fn fire(
        &self,
        request: PublishRequest,
        log_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<PublishOutcome> {
        match self.publisher.publish(&request, log_id).await {
            Ok(outcome) => {
                if let Some(id) = log_id {
                    self.history
                        .mark_posted(
                            id,
                            &outcome.facebook_post_id,
                            outcome.instagram_media_id(),
                            outcome.privacy,
                            Some(at),
                        )
                        .await?;
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!("Scheduled publish failed: {}", e);
                if let Some(id) = log_id {
                    if let Err(mark) = self.history.mark_failed(id).await {
                        warn!("Could not mark {} as failed: {}", id, mark);
                    }
                }
                Err(e)
            }
        }
    }

    async fn cancelled(&self, log_id: Option<&str>) {
        if let Some(id) = log_id {
            if let Err(e) = self.history.mark_failed(id).await {
                warn!("Could not mark {} as failed: {}", id, e);
            }
        }
        self.events.emit(Event::ScheduleCancelled {
            log_id: log_id.map(str::to_string),
        });
    }
}
