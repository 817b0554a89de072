//! Caption, image and video generation
//!
//! Every call goes through a [`GenerativeApi`], so the service runs the same
//! against the real client and the mock. Responses that carry no usable
//! output are classified here (blocked content, empty answer, missing video)
//! rather than left for callers to detect.

use std::str::FromStr;
use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, instrument};

use crate::config::{GeminiConfig, GenerationConfig, PollPolicy};
use crate::error::{ApiError, GenerationError, PagecastError, Result};
use crate::media::UploadedMedia;
use crate::platforms::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerativeApi, ImageInstance,
    ImageParameters, ImagePredictRequest, Part, SeedImage, ThinkingConfig, VideoInstance,
    VideoOperation, VideoParameters, VideoRequest,
};
use crate::prompts::{caption_prompt, image_prompt};
use crate::service::events::{Event, EventBus};
use crate::types::PostKind;

const SAFETY_FINISH: &str = "SAFETY";
const IMAGE_MIME: &str = "image/png";
const VIDEO_MIME: &str = "video/mp4";
const VIDEO_TASK: &str = "video";

/// Orientation of a generated video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Landscape,
    Portrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

impl FromStr for AspectRatio {
    type Err = PagecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "16:9" => Ok(AspectRatio::Landscape),
            "9:16" => Ok(AspectRatio::Portrait),
            other => Err(PagecastError::InvalidInput(format!(
                "Invalid aspect ratio: '{}'. Valid options: 16:9, 9:16",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs for one caption
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    /// Product details pasted from a spreadsheet
    pub sheet_data: String,
    pub media: Vec<UploadedMedia>,
    /// Extra style instructions, usually a saved template
    pub instructions: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Clone)]
pub struct GenerationService {
    api: Arc<dyn GenerativeApi>,
    models: GeminiConfig,
    settings: GenerationConfig,
    events: EventBus,
}

impl GenerationService {
    pub fn new(
        api: Arc<dyn GenerativeApi>,
        models: GeminiConfig,
        settings: GenerationConfig,
        events: EventBus,
    ) -> Self {
        Self {
            api,
            models,
            settings,
            events,
        }
    }

    fn progress(&self, task: &str, message: &str) {
        self.events.emit(Event::GenerationProgress {
            task: task.to_string(),
            message: message.to_string(),
        });
    }

    /// Write a caption for the given media
    #[instrument(skip_all, fields(media = request.media.len()))]
    pub async fn caption(&self, request: &CaptionRequest) -> Result<String> {
        let kind = crate::media::post_kind_of(&request.media).ok_or_else(|| {
            PagecastError::InvalidInput("Add at least one image or video".to_string())
        })?;
        if request.sheet_data.trim().is_empty() {
            return Err(PagecastError::InvalidInput(
                "Provide product details for the caption".to_string(),
            ));
        }

        let body = self.caption_request(request, kind);
        let response = self
            .api
            .generate_content(&self.models.text_model, &body)
            .await?;
        let caption = answer_text(&response)?;
        info!(chars = caption.len(), "Caption generated");
        Ok(caption)
    }

    fn caption_request(&self, request: &CaptionRequest, kind: PostKind) -> GenerateContentRequest {
        let max_tokens = request.max_tokens.unwrap_or(self.settings.max_tokens);
        let prompt = caption_prompt(&request.sheet_data, kind, request.instructions.as_deref());

        let mut parts = vec![Part::text(prompt)];
        parts.extend(
            request
                .media
                .iter()
                .map(|media| Part::inline(&media.mime_type, &media.data)),
        );

        GenerateContentRequest {
            contents: vec![Content::user(parts)],
            system_instruction: None,
            generation_config: Some(crate::platforms::GenerationConfig {
                temperature: Some(request.temperature.unwrap_or(self.settings.temperature)),
                max_output_tokens: Some(max_tokens),
                // Keeps part of the budget for the answer itself
                thinking_config: Some(ThinkingConfig {
                    thinking_budget: max_tokens / 2,
                }),
            }),
        }
    }

    /// Generate one square marketing photo
    #[instrument(skip_all)]
    pub async fn image(&self, subject: &str) -> Result<UploadedMedia> {
        if subject.trim().is_empty() {
            return Err(PagecastError::InvalidInput(
                "Describe the image to generate".to_string(),
            ));
        }

        let request = ImagePredictRequest {
            instances: vec![ImageInstance {
                prompt: image_prompt(subject),
            }],
            parameters: ImageParameters {
                sample_count: 1,
                aspect_ratio: "1:1".to_string(),
                output_mime_type: IMAGE_MIME.to_string(),
            },
        };
        let response = self
            .api
            .predict_image(&self.models.image_model, &request)
            .await?;

        let prediction = response
            .predictions
            .into_iter()
            .find(|p| p.bytes_base64_encoded.is_some())
            .ok_or_else(|| ApiError::ContentBlocked {
                reason: "no image was returned for this prompt".to_string(),
            })?;
        let mime_type = prediction.mime_type.unwrap_or_else(|| IMAGE_MIME.to_string());
        let data = prediction.bytes_base64_encoded.unwrap_or_default();
        UploadedMedia::from_base64(data, &mime_type)
    }

    /// Generate a short video, optionally seeded with an image
    ///
    /// Polls the long-running operation until it reports done, then
    /// downloads the first sample.
    #[instrument(skip_all, fields(aspect = %aspect))]
    pub async fn video(
        &self,
        prompt: &str,
        aspect: AspectRatio,
        seed: Option<&UploadedMedia>,
    ) -> Result<UploadedMedia> {
        if prompt.trim().is_empty() {
            return Err(PagecastError::InvalidInput(
                "Describe the video to generate".to_string(),
            ));
        }
        if let Some(seed) = seed {
            if seed.kind != crate::types::MediaKind::Image {
                return Err(PagecastError::InvalidInput(
                    "The seed for a video must be an image".to_string(),
                ));
            }
        }

        self.progress(VIDEO_TASK, "Submitting video request");
        let request = VideoRequest {
            instances: vec![VideoInstance {
                prompt: prompt.trim().to_string(),
                image: seed.map(|media| SeedImage {
                    bytes_base64_encoded: media.data.clone(),
                    mime_type: media.mime_type.clone(),
                }),
            }],
            parameters: VideoParameters {
                aspect_ratio: aspect.as_str().to_string(),
                sample_count: 1,
            },
        };
        let operation = self
            .api
            .start_video(&self.models.video_model, &request)
            .await?;

        self.progress(
            VIDEO_TASK,
            "Generating video. This can take several minutes",
        );
        let operation = self
            .wait_for_operation(operation, self.settings.video_poll())
            .await?;

        if let Some(error) = &operation.error {
            return Err(ApiError::from_gemini_value(error, None).into());
        }
        let uri = operation
            .video_uri()
            .ok_or(GenerationError::MissingVideo)?
            .to_string();

        self.progress(VIDEO_TASK, "Downloading video");
        let bytes = self.api.download(&uri).await?;
        self.progress(VIDEO_TASK, "Video ready");

        UploadedMedia::from_bytes(&bytes, VIDEO_MIME, None)
    }

    async fn wait_for_operation(
        &self,
        mut operation: VideoOperation,
        policy: PollPolicy,
    ) -> Result<VideoOperation> {
        let name = operation.name.clone();
        for attempt in 1..=policy.max_attempts {
            if operation.done {
                return Ok(operation);
            }
            sleep(policy.interval).await;
            operation = self.api.video_operation(&name).await?;
            debug!(attempt, done = operation.done, "Polled video operation");
        }
        if operation.done {
            return Ok(operation);
        }

        Err(GenerationError::Timeout {
            what: "Video generation".to_string(),
            attempts: policy.max_attempts,
        }
        .into())
    }
}

/// Trimmed answer text, or the reason there is none
pub(crate) fn answer_text(response: &GenerateContentResponse) -> Result<String> {
    if let Some(text) = response.text() {
        return Ok(text.trim().to_string());
    }
    if let Some(reason) = response.block_reason() {
        return Err(ApiError::ContentBlocked {
            reason: reason.to_string(),
        }
        .into());
    }
    if response.finish_reason() == Some(SAFETY_FINISH) {
        return Err(ApiError::ContentBlocked {
            reason: SAFETY_FINISH.to_string(),
        }
        .into());
    }
    Err(GenerationError::EmptyResponse.into())
}
