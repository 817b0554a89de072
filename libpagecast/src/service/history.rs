//! Post history log
//!
//! Entries are kept newest first and capped at [`HISTORY_CAP`]; the oldest
//! fall off the end. Every change is a read-modify-write of the stored list,
//! so several processes can share one store. At most one entry is "active"
//! (the one being composed).

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{PagecastError, Result};
use crate::store::{Store, HISTORY_KEY};
use crate::types::{LogEntry, LogStatus, Privacy};

pub const HISTORY_CAP: usize = 50;

#[derive(Debug, Default)]
struct HistoryState {
    entries: Vec<LogEntry>,
    active: Option<String>,
}

/// Drop the oldest entries past the cap
pub fn cap_history(entries: &mut Vec<LogEntry>) {
    entries.truncate(HISTORY_CAP);
}

#[derive(Clone)]
pub struct HistoryService {
    store: Store,
    state: Arc<Mutex<HistoryState>>,
}

impl HistoryService {
    /// Load the saved history from `store`
    pub async fn load(store: Store) -> Result<Self> {
        let entries = Self::read(&store).await?;
        debug!("Loaded {} history entries", entries.len());

        Ok(Self {
            store,
            state: Arc::new(Mutex::new(HistoryState {
                entries,
                active: None,
            })),
        })
    }

    async fn read(store: &Store) -> Result<Vec<LogEntry>> {
        let mut entries: Vec<LogEntry> = store.get_json(HISTORY_KEY).await?.unwrap_or_default();
        cap_history(&mut entries);
        Ok(entries)
    }

    /// Pick up entries other processes wrote since this one loaded
    pub async fn refresh(&self) -> Result<()> {
        let entries = Self::read(&self.store).await?;
        self.state.lock().await.entries = entries;
        Ok(())
    }

    /// Change the stored list in one write transaction
    ///
    /// The change runs against the list as it is on disk, not the cached
    /// copy, so entries written by another process survive. The cache only
    /// takes the new list once the write has committed.
    async fn modify<R, F>(&self, state: &mut HistoryState, change: F) -> Result<R>
    where
        R: Send,
        F: FnOnce(&mut Vec<LogEntry>) -> Result<R> + Send,
    {
        let (entries, output) = self
            .store
            .update_json(HISTORY_KEY, |entries: &mut Vec<LogEntry>| {
                cap_history(entries);
                let output = change(entries)?;
                cap_history(entries);
                Ok(output)
            })
            .await?;
        state.entries = entries;
        Ok(output)
    }

    /// Add a new entry at the front and make it active
    pub async fn record(&self, entry: LogEntry) -> Result<LogEntry> {
        let mut state = self.state.lock().await;
        let recorded = entry.clone();
        self.modify(&mut state, move |entries| {
            entries.insert(0, recorded);
            Ok(())
        })
        .await?;
        state.active = Some(entry.id.clone());
        Ok(entry)
    }

    /// Newest first, optionally limited
    pub async fn list(&self, limit: Option<usize>) -> Vec<LogEntry> {
        let state = self.state.lock().await;
        let take = limit.unwrap_or(state.entries.len());
        state.entries.iter().take(take).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, id: &str) -> Option<LogEntry> {
        let state = self.state.lock().await;
        state.entries.iter().find(|e| e.id == id).cloned()
    }

    /// Look up an entry, reloading first so entries saved elsewhere are found
    pub async fn require(&self, id: &str) -> Result<LogEntry> {
        self.refresh().await?;
        self.get(id)
            .await
            .ok_or_else(|| PagecastError::InvalidInput(format!("No history entry with id '{}'", id)))
    }

    pub async fn active_id(&self) -> Option<String> {
        self.state.lock().await.active.clone()
    }

    async fn set_active(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.entries.iter().any(|e| e.id == id) {
            return Err(PagecastError::InvalidInput(format!(
                "No history entry with id '{}'",
                id
            )));
        }
        state.active = Some(id.to_string());
        Ok(())
    }

    /// Apply `change` to one entry and persist
    ///
    /// `change` works on a copy, so a refused change leaves the entry
    /// untouched both on disk and in memory.
    pub async fn update<F>(&self, id: &str, change: F) -> Result<LogEntry>
    where
        F: FnOnce(&mut LogEntry) -> Result<()> + Send,
    {
        let mut state = self.state.lock().await;
        self.modify(&mut state, move |entries| {
            let entry = entries.iter_mut().find(|e| e.id == id).ok_or_else(|| {
                PagecastError::InvalidInput(format!("No history entry with id '{}'", id))
            })?;
            let mut updated = entry.clone();
            change(&mut updated)?;
            *entry = updated.clone();
            Ok(updated)
        })
        .await
    }

    /// Entry to publish: the entry itself, or a fresh copy when it failed before
    pub async fn prepare_for_publish(&self, id: &str) -> Result<LogEntry> {
        let entry = self.require(id).await?;
        match entry.status {
            LogStatus::Generated => {
                self.set_active(id).await?;
                Ok(entry)
            }
            LogStatus::Failed => self.record(entry.retry_copy()).await,
            LogStatus::Posted | LogStatus::Scheduled => Err(PagecastError::InvalidInput(format!(
                "Post {} is already {}",
                id,
                entry.status.to_string().to_lowercase()
            ))),
        }
    }

    pub async fn mark_scheduled(&self, id: &str, at: DateTime<Utc>) -> Result<LogEntry> {
        let entry = self
            .update(id, |entry| {
                entry.transition(LogStatus::Scheduled)?;
                entry.scheduled_at = Some(at);
                Ok(())
            })
            .await?;
        self.release_active(id).await;
        Ok(entry)
    }

    /// Facebook accepted the post and will publish it itself at `at`
    pub async fn mark_natively_scheduled(
        &self,
        id: &str,
        at: DateTime<Utc>,
        facebook_post_id: &str,
    ) -> Result<LogEntry> {
        let entry = self
            .update(id, |entry| {
                entry.transition(LogStatus::Scheduled)?;
                entry.scheduled_at = Some(at);
                entry.facebook_post_id = Some(facebook_post_id.to_string());
                entry.privacy = Some(Privacy::Published);
                Ok(())
            })
            .await?;
        self.release_active(id).await;
        Ok(entry)
    }

    pub async fn mark_posted(
        &self,
        id: &str,
        facebook_post_id: &str,
        instagram_media_id: Option<&str>,
        privacy: Privacy,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<LogEntry> {
        let entry = self
            .update(id, |entry| {
                entry.transition(LogStatus::Posted)?;
                entry.facebook_post_id = Some(facebook_post_id.to_string());
                entry.instagram_media_id = instagram_media_id.map(str::to_string);
                entry.privacy = Some(privacy);
                if scheduled_at.is_some() {
                    entry.scheduled_at = scheduled_at;
                }
                Ok(())
            })
            .await?;
        self.release_active(id).await;
        Ok(entry)
    }

    pub async fn mark_failed(&self, id: &str) -> Result<LogEntry> {
        self.update(id, |entry| entry.transition(LogStatus::Failed))
            .await
    }

    /// Record a "publish now" on an unpublished post
    pub async fn mark_republished(&self, id: &str) -> Result<LogEntry> {
        self.update(id, |entry| {
            if entry.status != LogStatus::Posted || entry.privacy != Some(Privacy::Unpublished) {
                return Err(PagecastError::InvalidInput(format!(
                    "Post {} is not an unpublished post",
                    entry.id
                )));
            }
            entry.privacy = Some(Privacy::Published);
            Ok(())
        })
        .await
    }

    async fn release_active(&self, id: &str) {
        let mut state = self.state.lock().await;
        if state.active.as_deref() == Some(id) {
            state.active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostKind;

    async fn service() -> HistoryService {
        HistoryService::load(Store::in_memory().await.unwrap())
            .await
            .unwrap()
    }

    fn entry(caption: &str) -> LogEntry {
        LogEntry::new(caption.to_string(), None, PostKind::Image, "page".to_string())
    }

    #[tokio::test]
    async fn test_record_is_newest_first_and_active() {
        let history = service().await;
        let first = history.record(entry("one")).await.unwrap();
        let second = history.record(entry("two")).await.unwrap();

        let list = history.list(None).await;
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[1].id, first.id);
        assert_eq!(history.active_id().await, Some(second.id));
    }

    #[tokio::test]
    async fn test_cap_evicts_oldest() {
        let history = service().await;
        let mut ids = Vec::new();
        for i in 0..(HISTORY_CAP + 7) {
            ids.push(history.record(entry(&i.to_string())).await.unwrap().id);
        }

        let list = history.list(None).await;
        assert_eq!(list.len(), HISTORY_CAP);
        assert_eq!(list[0].id, *ids.last().unwrap());
        // The first seven are gone
        for evicted in &ids[..7] {
            assert!(history.get(evicted).await.is_none());
        }
        assert_eq!(list.last().unwrap().id, ids[7]);
    }

    #[tokio::test]
    async fn test_mark_posted_releases_active() {
        let history = service().await;
        let e = history.record(entry("c")).await.unwrap();

        let posted = history
            .mark_posted(&e.id, "123_456", None, Privacy::Published, None)
            .await
            .unwrap();
        assert_eq!(posted.status, LogStatus::Posted);
        assert_eq!(posted.facebook_post_id.as_deref(), Some("123_456"));
        assert!(history.active_id().await.is_none());
    }

    #[tokio::test]
    async fn test_refused_transition_leaves_entry_untouched() {
        let history = service().await;
        let e = history.record(entry("c")).await.unwrap();
        history
            .mark_posted(&e.id, "1", None, Privacy::Published, None)
            .await
            .unwrap();

        let result = history.mark_scheduled(&e.id, Utc::now()).await;
        assert!(matches!(result, Err(PagecastError::InvalidInput(_))));

        let stored = history.get(&e.id).await.unwrap();
        assert_eq!(stored.status, LogStatus::Posted);
        assert!(stored.scheduled_at.is_none());
    }

    #[tokio::test]
    async fn test_prepare_failed_entry_creates_copy() {
        let history = service().await;
        let e = history.record(entry("retry me")).await.unwrap();
        history.mark_failed(&e.id).await.unwrap();

        let retry = history.prepare_for_publish(&e.id).await.unwrap();
        assert_ne!(retry.id, e.id);
        assert_eq!(retry.status, LogStatus::Generated);
        assert_eq!(retry.caption, "retry me");
        assert_eq!(history.len().await, 2);
        assert_eq!(history.get(&e.id).await.unwrap().status, LogStatus::Failed);
        assert_eq!(history.active_id().await, Some(retry.id));
    }

    #[tokio::test]
    async fn test_prepare_posted_entry_is_rejected() {
        let history = service().await;
        let e = history.record(entry("c")).await.unwrap();
        history
            .mark_posted(&e.id, "1", None, Privacy::Published, None)
            .await
            .unwrap();
        assert!(history.prepare_for_publish(&e.id).await.is_err());
    }

    #[tokio::test]
    async fn test_republish_only_flips_privacy() {
        let history = service().await;
        let e = history.record(entry("c")).await.unwrap();
        history
            .mark_posted(&e.id, "1", None, Privacy::Unpublished, None)
            .await
            .unwrap();

        let updated = history.mark_republished(&e.id).await.unwrap();
        assert_eq!(updated.status, LogStatus::Posted);
        assert_eq!(updated.privacy, Some(Privacy::Published));

        // Second time there is nothing to flip
        assert!(history.mark_republished(&e.id).await.is_err());
    }

    #[tokio::test]
    async fn test_natively_scheduled_keeps_post_id() {
        let history = service().await;
        let e = history.record(entry("later")).await.unwrap();
        let at = Utc::now() + chrono::Duration::hours(3);

        let scheduled = history
            .mark_natively_scheduled(&e.id, at, "111_9")
            .await
            .unwrap();
        assert_eq!(scheduled.status, LogStatus::Scheduled);
        assert_eq!(scheduled.scheduled_at, Some(at));
        assert_eq!(scheduled.facebook_post_id.as_deref(), Some("111_9"));
        assert!(history.active_id().await.is_none());
    }

    #[tokio::test]
    async fn test_set_active_unknown_id() {
        let history = service().await;
        assert!(history.set_active("post_0_missing").await.is_err());
        assert!(history.active_id().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_untouched() {
        let store = Store::in_memory().await.unwrap();
        let history = HistoryService::load(store.clone()).await.unwrap();
        let kept = history.record(entry("kept")).await.unwrap();

        // Anything that is not a list makes the next write fail
        store.set_json(HISTORY_KEY, "not a list").await.unwrap();

        assert!(history.record(entry("lost")).await.is_err());
        assert!(history.mark_failed(&kept.id).await.is_err());

        let list = history.list(None).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, kept.id);
        assert_eq!(list[0].status, LogStatus::Generated);
        assert_eq!(history.active_id().await, Some(kept.id));
    }
}
