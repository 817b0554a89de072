//! Core types for Pagecast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PagecastError, Result};

/// Whether a single media item is a still image or a video
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Derive the kind from a MIME type string (e.g., "image/png")
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.to_lowercase();
        if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// Shape of a composed post
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Image,
    Video,
    Carousel,
}

impl std::fmt::Display for PostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostKind::Image => write!(f, "image"),
            PostKind::Video => write!(f, "video"),
            PostKind::Carousel => write!(f, "carousel"),
        }
    }
}

/// Feed visibility for an immediate (unscheduled) post
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Published,
    Unpublished,
}

impl std::fmt::Display for Privacy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Privacy::Published => write!(f, "published"),
            Privacy::Unpublished => write!(f, "unpublished"),
        }
    }
}

/// Lifecycle of a history entry
///
/// Permitted edges: `Generated → Posted | Scheduled | Failed` and
/// `Scheduled → Posted | Failed`. Nothing moves backwards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogStatus {
    Generated,
    Posted,
    Scheduled,
    Failed,
}

impl LogStatus {
    pub fn can_transition_to(self, next: LogStatus) -> bool {
        use LogStatus::*;
        matches!(
            (self, next),
            (Generated, Posted)
                | (Generated, Scheduled)
                | (Generated, Failed)
                | (Scheduled, Posted)
                | (Scheduled, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LogStatus::Posted | LogStatus::Failed)
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogStatus::Generated => write!(f, "Generated"),
            LogStatus::Posted => write!(f, "Posted"),
            LogStatus::Scheduled => write!(f, "Scheduled"),
            LogStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// One composed post in the history log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub caption: String,
    /// Small JPEG preview as a data URL (absent for video)
    pub thumbnail: Option<String>,
    pub media_kind: PostKind,
    pub status: LogStatus,
    pub page_id: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub facebook_post_id: Option<String>,
    pub instagram_media_id: Option<String>,
    pub privacy: Option<Privacy>,
}

impl LogEntry {
    pub fn new(caption: String, thumbnail: Option<String>, media_kind: PostKind, page_id: String) -> Self {
        let created_at = Utc::now();
        let short = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("post_{}_{}", created_at.timestamp_millis(), &short[..8]),
            created_at,
            caption,
            thumbnail,
            media_kind,
            status: LogStatus::Generated,
            page_id,
            scheduled_at: None,
            facebook_post_id: None,
            instagram_media_id: None,
            privacy: None,
        }
    }

    /// Move to `next`, refusing any edge outside the lifecycle
    pub fn transition(&mut self, next: LogStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(PagecastError::InvalidInput(format!(
                "Post {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Fresh `Generated` copy used when a failed entry is published again
    pub fn retry_copy(&self) -> Self {
        let mut copy = LogEntry::new(
            self.caption.clone(),
            self.thumbnail.clone(),
            self.media_kind,
            self.page_id.clone(),
        );
        copy.privacy = None;
        copy
    }
}

/// Named caption instruction preset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: String,
    pub value: String,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl std::str::FromStr for Theme {
    type Err = PagecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(PagecastError::InvalidInput(format!(
                "Invalid theme: '{}'. Valid options: light, dark",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LogStatus; 4] = [
        LogStatus::Generated,
        LogStatus::Posted,
        LogStatus::Scheduled,
        LogStatus::Failed,
    ];

    #[test]
    fn test_permitted_edges() {
        assert!(LogStatus::Generated.can_transition_to(LogStatus::Posted));
        assert!(LogStatus::Generated.can_transition_to(LogStatus::Scheduled));
        assert!(LogStatus::Generated.can_transition_to(LogStatus::Failed));
        assert!(LogStatus::Scheduled.can_transition_to(LogStatus::Posted));
        assert!(LogStatus::Scheduled.can_transition_to(LogStatus::Failed));
    }

    #[test]
    fn test_no_other_edges() {
        let permitted = [
            (LogStatus::Generated, LogStatus::Posted),
            (LogStatus::Generated, LogStatus::Scheduled),
            (LogStatus::Generated, LogStatus::Failed),
            (LogStatus::Scheduled, LogStatus::Posted),
            (LogStatus::Scheduled, LogStatus::Failed),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    permitted.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_transition_rejects_reverse_edge() {
        let mut entry = LogEntry::new("caption".into(), None, PostKind::Image, "123".into());
        entry.transition(LogStatus::Posted).unwrap();

        let result = entry.transition(LogStatus::Generated);
        assert!(matches!(result, Err(PagecastError::InvalidInput(_))));
        assert_eq!(entry.status, LogStatus::Posted);
    }

    #[test]
    fn test_log_entry_id_format() {
        let entry = LogEntry::new("caption".into(), None, PostKind::Video, "123".into());
        assert!(entry.id.starts_with("post_"));
        assert_eq!(entry.status, LogStatus::Generated);

        let other = LogEntry::new("caption".into(), None, PostKind::Video, "123".into());
        assert_ne!(entry.id, other.id);
    }

    #[test]
    fn test_retry_copy_is_fresh() {
        let mut entry = LogEntry::new("caption".into(), Some("data:x".into()), PostKind::Carousel, "9".into());
        entry.transition(LogStatus::Failed).unwrap();

        let copy = entry.retry_copy();
        assert_ne!(copy.id, entry.id);
        assert_eq!(copy.status, LogStatus::Generated);
        assert_eq!(copy.caption, entry.caption);
        assert_eq!(copy.thumbnail, entry.thumbnail);
        assert_eq!(copy.media_kind, PostKind::Carousel);
    }

    #[test]
    fn test_media_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("image/png"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_mime("VIDEO/MP4"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_mime("application/pdf"), None);
    }

    #[test]
    fn test_theme_parse() {
        assert_eq!("dark".parse::<Theme>().unwrap(), Theme::Dark);
        assert_eq!("LIGHT".parse::<Theme>().unwrap(), Theme::Light);
        assert!("blue".parse::<Theme>().is_err());
    }

    #[test]
    fn test_log_entry_serializes_status_names() {
        let entry = LogEntry::new("c".into(), None, PostKind::Image, "1".into());
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"Generated\""));
        assert!(json.contains("\"image\""));
    }
}
