//! Scriptable mock implementations of the API seams
//!
//! Both mocks record every call so tests can assert on the exact sequence of
//! requests a workflow made. Failures are injected per operation and are
//! returned as already-classified [`ApiError`]s, the same way the real
//! clients return them.

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{ApiError, PagecastError, Result};
use crate::media::UploadedMedia;
use crate::platforms::{
    ContainerSpec, ContainerStatus, GenerateContentRequest, GenerateContentResponse,
    GenerativeApi, GraphApi, GraphObject, ImagePredictRequest, ImagePredictResponse,
    InstagramAccount, VideoOperation, VideoRequest, Visibility,
};
use crate::types::MediaKind;

/// One recorded Graph API call
#[derive(Debug, Clone, PartialEq)]
pub enum GraphCall {
    PageToken { page_id: String },
    PageName { page_id: String },
    InstagramAccount { page_id: String },
    UploadPhoto { caption: Option<String>, visibility: Visibility },
    UploadVideo { description: String, visibility: Visibility },
    FeedPost { message: String, attachment_ids: Vec<String>, visibility: Visibility },
    MediaUrl { media_id: String },
    CreateContainer { instagram_id: String, spec: ContainerSpec },
    ContainerStatus { container_id: String },
    PublishContainer { instagram_id: String, creation_id: String },
    Republish { post_id: String },
}

impl GraphCall {
    /// Operation name used for failure injection
    pub fn operation(&self) -> &'static str {
        match self {
            GraphCall::PageToken { .. } => "page_token",
            GraphCall::PageName { .. } => "page_name",
            GraphCall::InstagramAccount { .. } => "instagram_account",
            GraphCall::UploadPhoto { .. } => "upload_photo",
            GraphCall::UploadVideo { .. } => "upload_video",
            GraphCall::FeedPost { .. } => "feed_post",
            GraphCall::MediaUrl { .. } => "media_url",
            GraphCall::CreateContainer { .. } => "create_container",
            GraphCall::ContainerStatus { .. } => "container_status",
            GraphCall::PublishContainer { .. } => "publish_container",
            GraphCall::Republish { .. } => "republish",
        }
    }
}

/// Mock Graph API
///
/// Container status polls follow the script set by
/// [`MockGraph::with_container_statuses`]; each container gets its own copy
/// of the script and repeats the last status once it runs out.
/// [`MockGraph::with_container_script`] overrides the script for one
/// container, picked by creation order.
pub struct MockGraph {
    calls: Arc<Mutex<Vec<GraphCall>>>,
    failures: Mutex<HashMap<&'static str, ApiError>>,
    status_script: Mutex<Vec<ContainerStatus>>,
    container_queues: Mutex<HashMap<String, VecDeque<ContainerStatus>>>,
    container_scripts: Mutex<HashMap<usize, Vec<ContainerStatus>>>,
    containers_created: AtomicUsize,
    page_name: String,
    instagram: Option<InstagramAccount>,
    upload_delay: Duration,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGraph {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Mutex::new(HashMap::new()),
            status_script: Mutex::new(vec![ContainerStatus::Finished]),
            container_queues: Mutex::new(HashMap::new()),
            container_scripts: Mutex::new(HashMap::new()),
            containers_created: AtomicUsize::new(0),
            page_name: "Mock Page".to_string(),
            instagram: Some(InstagramAccount {
                id: "ig_mock".to_string(),
                username: Some("mockshop".to_string()),
            }),
            upload_delay: Duration::ZERO,
            next_id: AtomicUsize::new(1),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_container_statuses(self, statuses: Vec<ContainerStatus>) -> Self {
        if let Ok(mut script) = self.status_script.lock() {
            *script = statuses;
        }
        self
    }

    /// Script the statuses of the `index`th container created (0-based)
    pub fn with_container_script(self, index: usize, statuses: Vec<ContainerStatus>) -> Self {
        if let Ok(mut scripts) = self.container_scripts.lock() {
            scripts.insert(index, statuses);
        }
        self
    }

    pub fn with_page_name(mut self, name: &str) -> Self {
        self.page_name = name.to_string();
        self
    }

    pub fn without_instagram(mut self) -> Self {
        self.instagram = None;
        self
    }

    /// Delay every photo upload (for concurrency tests)
    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    /// Make every call to `operation` fail with `error`
    pub fn failing(self, operation: &'static str, error: ApiError) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(operation, error);
        }
        self
    }

    pub fn calls(&self) -> Vec<GraphCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Highest number of photo uploads observed in flight at once
    pub fn max_concurrent_uploads(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: GraphCall) -> Result<()> {
        let operation = call.operation();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|failures| failures.get(operation).cloned());
        match failure {
            Some(error) => Err(PagecastError::Api(error)),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn next_status(&self, container_id: &str) -> ContainerStatus {
        let script = self
            .status_script
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        let Ok(mut queues) = self.container_queues.lock() else {
            return ContainerStatus::Finished;
        };
        let queue = queues
            .entry(container_id.to_string())
            .or_insert_with(|| script.into_iter().collect());

        match queue.len() {
            0 => ContainerStatus::Finished,
            1 => queue.front().cloned().unwrap_or(ContainerStatus::Finished),
            _ => queue.pop_front().unwrap_or(ContainerStatus::Finished),
        }
    }
}

#[async_trait]
impl GraphApi for MockGraph {
    async fn page_token(&self, page_id: &str, _user_token: &SecretString) -> Result<SecretString> {
        self.record(GraphCall::PageToken {
            page_id: page_id.to_string(),
        })?;
        Ok(SecretString::from(format!("page-token-{}", page_id)))
    }

    async fn page_name(&self, page_id: &str, _user_token: &SecretString) -> Result<String> {
        self.record(GraphCall::PageName {
            page_id: page_id.to_string(),
        })?;
        Ok(self.page_name.clone())
    }

    async fn instagram_account(
        &self,
        page_id: &str,
        _user_token: &SecretString,
    ) -> Result<Option<InstagramAccount>> {
        self.record(GraphCall::InstagramAccount {
            page_id: page_id.to_string(),
        })?;
        Ok(self.instagram.clone())
    }

    async fn upload_photo(
        &self,
        _page_id: &str,
        _page_token: &SecretString,
        media: &UploadedMedia,
        caption: Option<&str>,
        visibility: Visibility,
    ) -> Result<GraphObject> {
        // The upload name is embedded so tests can check ordering
        let id = format!("{}_{}", self.next_id("photo"), media.upload_name());
        self.record(GraphCall::UploadPhoto {
            caption: caption.map(str::to_string),
            visibility,
        })?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.upload_delay.is_zero() {
            sleep(self.upload_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let post_id = (visibility != Visibility::Attachment).then(|| format!("page_{}", id));
        Ok(GraphObject { id, post_id })
    }

    async fn upload_video(
        &self,
        _page_id: &str,
        _page_token: &SecretString,
        _media: &UploadedMedia,
        description: &str,
        visibility: Visibility,
    ) -> Result<GraphObject> {
        self.record(GraphCall::UploadVideo {
            description: description.to_string(),
            visibility,
        })?;
        Ok(GraphObject {
            id: self.next_id("video"),
            post_id: None,
        })
    }

    async fn create_feed_post(
        &self,
        page_id: &str,
        _page_token: &SecretString,
        message: &str,
        attachment_ids: &[String],
        visibility: Visibility,
    ) -> Result<String> {
        self.record(GraphCall::FeedPost {
            message: message.to_string(),
            attachment_ids: attachment_ids.to_vec(),
            visibility,
        })?;
        Ok(format!("{}_{}", page_id, self.next_id("feed")))
    }

    async fn media_url(
        &self,
        media_id: &str,
        kind: MediaKind,
        _page_token: &SecretString,
    ) -> Result<String> {
        self.record(GraphCall::MediaUrl {
            media_id: media_id.to_string(),
        })?;
        let ext = match kind {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        };
        Ok(format!("https://cdn.example.test/{}.{}", media_id, ext))
    }

    async fn create_container(
        &self,
        instagram_id: &str,
        _page_token: &SecretString,
        spec: &ContainerSpec,
    ) -> Result<String> {
        self.record(GraphCall::CreateContainer {
            instagram_id: instagram_id.to_string(),
            spec: spec.clone(),
        })?;
        let id = self.next_id("container");
        let index = self.containers_created.fetch_add(1, Ordering::SeqCst);
        let script = self
            .container_scripts
            .lock()
            .ok()
            .and_then(|scripts| scripts.get(&index).cloned());
        if let (Some(script), Ok(mut queues)) = (script, self.container_queues.lock()) {
            queues.insert(id.clone(), script.into_iter().collect());
        }
        Ok(id)
    }

    async fn container_status(
        &self,
        container_id: &str,
        _page_token: &SecretString,
    ) -> Result<ContainerStatus> {
        self.record(GraphCall::ContainerStatus {
            container_id: container_id.to_string(),
        })?;
        Ok(self.next_status(container_id))
    }

    async fn publish_container(
        &self,
        instagram_id: &str,
        _page_token: &SecretString,
        creation_id: &str,
    ) -> Result<String> {
        self.record(GraphCall::PublishContainer {
            instagram_id: instagram_id.to_string(),
            creation_id: creation_id.to_string(),
        })?;
        Ok(self.next_id("ig_media"))
    }

    async fn republish(&self, post_id: &str, _page_token: &SecretString) -> Result<()> {
        self.record(GraphCall::Republish {
            post_id: post_id.to_string(),
        })
    }
}

type Scripted<T> = std::result::Result<T, ApiError>;

/// Mock Generative Language API
///
/// Scripted responses are consumed in order; once a queue is empty the
/// default response is returned.
pub struct MockGenerative {
    text: Mutex<VecDeque<Scripted<GenerateContentResponse>>>,
    images: Mutex<VecDeque<Scripted<ImagePredictResponse>>>,
    operations: Mutex<VecDeque<Scripted<VideoOperation>>>,
    download: Mutex<Option<Scripted<Vec<u8>>>>,
    text_requests: Mutex<Vec<(String, GenerateContentRequest)>>,
    image_requests: Mutex<Vec<(String, ImagePredictRequest)>>,
    video_requests: Mutex<Vec<(String, VideoRequest)>>,
    operation_polls: AtomicUsize,
    downloads: Mutex<Vec<String>>,
}

impl Default for MockGenerative {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerative {
    pub fn new() -> Self {
        Self {
            text: Mutex::new(VecDeque::new()),
            images: Mutex::new(VecDeque::new()),
            operations: Mutex::new(VecDeque::new()),
            download: Mutex::new(None),
            text_requests: Mutex::new(Vec::new()),
            image_requests: Mutex::new(Vec::new()),
            video_requests: Mutex::new(Vec::new()),
            operation_polls: AtomicUsize::new(0),
            downloads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_text(self, response: Scripted<GenerateContentResponse>) -> Self {
        if let Ok(mut text) = self.text.lock() {
            text.push_back(response);
        }
        self
    }

    pub fn with_image(self, response: Scripted<ImagePredictResponse>) -> Self {
        if let Ok(mut images) = self.images.lock() {
            images.push_back(response);
        }
        self
    }

    /// Responses for successive operation polls
    pub fn with_operations(self, responses: Vec<Scripted<VideoOperation>>) -> Self {
        if let Ok(mut operations) = self.operations.lock() {
            operations.extend(responses);
        }
        self
    }

    pub fn with_download(self, response: Scripted<Vec<u8>>) -> Self {
        if let Ok(mut download) = self.download.lock() {
            *download = Some(response);
        }
        self
    }

    pub fn text_requests(&self) -> Vec<(String, GenerateContentRequest)> {
        self.text_requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn image_requests(&self) -> Vec<(String, ImagePredictRequest)> {
        self.image_requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn video_requests(&self) -> Vec<(String, VideoRequest)> {
        self.video_requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn operation_polls(&self) -> usize {
        self.operation_polls.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().map(|d| d.clone()).unwrap_or_default()
    }

    fn pop<T>(queue: &Mutex<VecDeque<Scripted<T>>>, default: impl FnOnce() -> T) -> Result<T> {
        let next = queue.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(value)) => Ok(value),
            Some(Err(error)) => Err(PagecastError::Api(error)),
            None => Ok(default()),
        }
    }
}

#[async_trait]
impl GenerativeApi for MockGenerative {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        if let Ok(mut requests) = self.text_requests.lock() {
            requests.push((model.to_string(), request.clone()));
        }
        Self::pop(&self.text, || GenerateContentResponse::from_text("Mock caption"))
    }

    async fn predict_image(
        &self,
        model: &str,
        request: &ImagePredictRequest,
    ) -> Result<ImagePredictResponse> {
        if let Ok(mut requests) = self.image_requests.lock() {
            requests.push((model.to_string(), request.clone()));
        }
        Self::pop(&self.images, ImagePredictResponse::default)
    }

    async fn start_video(&self, model: &str, request: &VideoRequest) -> Result<VideoOperation> {
        if let Ok(mut requests) = self.video_requests.lock() {
            requests.push((model.to_string(), request.clone()));
        }
        Ok(VideoOperation {
            name: "models/mock/operations/1".to_string(),
            ..Default::default()
        })
    }

    async fn video_operation(&self, name: &str) -> Result<VideoOperation> {
        self.operation_polls.fetch_add(1, Ordering::SeqCst);
        Self::pop(&self.operations, || VideoOperation {
            name: name.to_string(),
            ..Default::default()
        })
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>> {
        if let Ok(mut downloads) = self.downloads.lock() {
            downloads.push(uri.to_string());
        }
        let scripted = self.download.lock().ok().and_then(|d| d.clone());
        match scripted {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(error)) => Err(PagecastError::Api(error)),
            None => Ok(b"mock-video".to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Provider;

    fn token() -> SecretString {
        SecretString::from("user".to_string())
    }

    #[tokio::test]
    async fn test_status_script_repeats_last() {
        let graph = MockGraph::new().with_container_statuses(vec![
            ContainerStatus::InProgress,
            ContainerStatus::Finished,
        ]);

        let t = token();
        assert_eq!(graph.container_status("c1", &t).await.unwrap(), ContainerStatus::InProgress);
        assert_eq!(graph.container_status("c1", &t).await.unwrap(), ContainerStatus::Finished);
        assert_eq!(graph.container_status("c1", &t).await.unwrap(), ContainerStatus::Finished);

        // Separate container starts from the top of the script
        assert_eq!(graph.container_status("c2", &t).await.unwrap(), ContainerStatus::InProgress);
        assert_eq!(graph.count("container_status"), 4);
    }

    #[tokio::test]
    async fn test_failure_injection_records_call() {
        let graph = MockGraph::new().failing(
            "page_token",
            ApiError::Credential {
                provider: Provider::Graph,
                message: "expired".into(),
            },
        );

        let result = graph.page_token("123", &token()).await;
        assert!(matches!(
            result,
            Err(PagecastError::Api(ApiError::Credential { .. }))
        ));
        assert_eq!(graph.calls(), vec![GraphCall::PageToken { page_id: "123".into() }]);
    }

    #[tokio::test]
    async fn test_generative_queue_then_default() {
        let mock = MockGenerative::new().with_text(Ok(GenerateContentResponse::from_text("first")));
        let request = GenerateContentRequest::prompt("hi");

        let first = mock.generate_content("m", &request).await.unwrap();
        assert_eq!(first.text().as_deref(), Some("first"));
        let second = mock.generate_content("m", &request).await.unwrap();
        assert_eq!(second.text().as_deref(), Some("Mock caption"));
        assert_eq!(mock.text_requests().len(), 2);
    }
}
