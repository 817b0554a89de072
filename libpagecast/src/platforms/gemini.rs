//! Google Generative Language API client and wire types

use async_trait::async_trait;
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::GeminiConfig;
use crate::error::{ApiError, GenerationError, PagecastError, Provider, Result};
use crate::platforms::GenerativeApi;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Some("model".to_string()),
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    /// Set on reasoning parts, which are not part of the answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn inline(mime_type: &str, data: &str) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub thinking_budget: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// Single user turn holding plain text
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            contents: vec![Content::user(vec![Part::text(text)])],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Answer text of the first candidate, skipping reasoning parts
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter(|part| part.thought != Some(true))
            .filter_map(|part| part.text.as_deref())
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref()?.block_reason.as_deref()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates.first()?.finish_reason.as_deref()
    }

    /// Convenience for mocks and tests
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content::model(text)),
                finish_reason: Some("STOP".to_string()),
            }],
            prompt_feedback: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImagePredictRequest {
    pub instances: Vec<ImageInstance>,
    pub parameters: ImageParameters,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageInstance {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageParameters {
    pub sample_count: u32,
    pub aspect_ratio: String,
    pub output_mime_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImagePredictResponse {
    #[serde(default)]
    pub predictions: Vec<ImagePrediction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImagePrediction {
    #[serde(default)]
    pub bytes_base64_encoded: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    pub instances: Vec<VideoInstance>,
    pub parameters: VideoParameters,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoInstance {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<SeedImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeedImage {
    pub bytes_base64_encoded: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoParameters {
    pub aspect_ratio: String,
    pub sample_count: u32,
}

/// Long-running operation returned by `predictLongRunning`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoOperation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub response: Option<Value>,
}

impl VideoOperation {
    /// URI of the first generated sample
    pub fn video_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .get("generateVideoResponse")?
            .get("generatedSamples")?
            .get(0)?
            .get("video")?
            .get("uri")?
            .as_str()
    }
}

/// Verified Generative Language API session
///
/// Only [`GeminiClient::verify`] builds one, so holding a client means the
/// key has already been accepted by the API.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Probe the API with a tiny request and return a session on success
    pub async fn verify(config: &GeminiConfig, api_key: SecretString) -> Result<Self> {
        Self::verify_with_client(reqwest::Client::new(), config, api_key).await
    }

    #[instrument(skip_all)]
    pub async fn verify_with_client(
        client: reqwest::Client,
        config: &GeminiConfig,
        api_key: SecretString,
    ) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(PagecastError::InvalidInput(
                "Enter a Google AI API key".to_string(),
            ));
        }

        let session = Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        };
        session
            .generate_content(&config.text_model, &GenerateContentRequest::prompt("ping"))
            .await?;
        debug!("Google AI API key verified");
        Ok(session)
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| ApiError::from_transport(Provider::GoogleAi, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::from_transport(Provider::GoogleAi, &e))?;

        let value: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) if !status.is_success() => Value::String(body),
            Err(e) => return Err(ApiError::malformed(Provider::GoogleAi, e.to_string()).into()),
        };

        if !status.is_success() {
            debug!(status = status.as_u16(), "Google AI returned an error");
            return Err(ApiError::from_gemini_value(&value, Some(status.as_u16())).into());
        }
        Ok(value)
    }

    fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
        serde_json::from_value(value)
            .map_err(|e| ApiError::malformed(Provider::GoogleAi, e.to_string()).into())
    }
}

#[async_trait]
impl GenerativeApi for GeminiClient {
    #[instrument(skip(self, request))]
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let value = self
            .send(self.client.post(self.model_url(model, "generateContent")).json(request))
            .await?;
        Self::decode(value)
    }

    #[instrument(skip(self, request))]
    async fn predict_image(
        &self,
        model: &str,
        request: &ImagePredictRequest,
    ) -> Result<ImagePredictResponse> {
        let value = self
            .send(self.client.post(self.model_url(model, "predict")).json(request))
            .await?;
        Self::decode(value)
    }

    #[instrument(skip(self, request))]
    async fn start_video(&self, model: &str, request: &VideoRequest) -> Result<VideoOperation> {
        let value = self
            .send(
                self.client
                    .post(self.model_url(model, "predictLongRunning"))
                    .json(request),
            )
            .await?;
        Self::decode(value)
    }

    #[instrument(skip(self))]
    async fn video_operation(&self, name: &str) -> Result<VideoOperation> {
        let url = format!("{}/{}", self.base_url, name.trim_start_matches('/'));
        let value = self.send(self.client.get(url)).await?;
        Self::decode(value)
    }

    #[instrument(skip(self, uri))]
    async fn download(&self, uri: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(uri)
            .query(&[("key", self.api_key.expose_secret())])
            .send()
            .await
            .map_err(|e| ApiError::from_transport(Provider::GoogleAi, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Download {
                status: status.as_u16(),
            }
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::from_transport(Provider::GoogleAi, &e))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serializes_camel_case() {
        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![
                Part::text("hello"),
                Part::inline("image/png", "AAAA"),
            ])],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                temperature: Some(0.5),
                max_output_tokens: Some(400),
                thinking_config: Some(ThinkingConfig { thinking_budget: 200 }),
            }),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 400);
        assert_eq!(value["generationConfig"]["thinkingConfig"]["thinkingBudget"], 200);
        assert!(value.get("systemInstruction").is_none());
    }

    #[test]
    fn test_response_text_skips_thoughts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "Fresh "},
                    {"text": "coffee!"}
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("Fresh coffee!"));
    }

    #[test]
    fn test_blocked_response() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        assert_eq!(response.text(), None);
        assert_eq!(response.block_reason(), Some("SAFETY"));
    }

    #[test]
    fn test_video_uri_extraction() {
        let operation: VideoOperation = serde_json::from_value(json!({
            "name": "models/veo/operations/abc",
            "done": true,
            "response": {"generateVideoResponse": {"generatedSamples": [
                {"video": {"uri": "https://files/v1?alt=media"}}
            ]}}
        }))
        .unwrap();
        assert_eq!(operation.video_uri(), Some("https://files/v1?alt=media"));

        let pending: VideoOperation =
            serde_json::from_value(json!({"name": "operations/x"})).unwrap();
        assert!(!pending.done);
        assert_eq!(pending.video_uri(), None);
    }

    #[tokio::test]
    async fn test_verify_rejects_blank_key() {
        let result = GeminiClient::verify(&GeminiConfig::default(), SecretString::from("  ".to_string())).await;
        assert!(matches!(result, Err(PagecastError::InvalidInput(_))));
    }
}
