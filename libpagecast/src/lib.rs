//! Pagecast - publish to a Facebook Page, cross-post to Instagram
//!
//! This library holds the publish workflow, the local scheduler, the Gemini
//! generation client, the capped post history and the error translation
//! shared by the `page-gen`, `page-post` and `page-history` tools.

pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod platforms;
pub mod prompts;
pub mod service;
pub mod store;
pub mod translate;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{ApiError, PagecastError, Result};
pub use media::UploadedMedia;
pub use service::{PagecastService, Submission, Submitted};
pub use store::Store;
pub use translate::translate;
pub use types::{LogEntry, LogStatus, PostKind, Privacy, PromptTemplate, Theme};
