//! Facebook Graph API client
//!
//! Photos, feed posts and Instagram container calls go to `graph_url`;
//! video uploads go to the separate `graph-video` host.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::FacebookConfig;
use crate::error::{ApiError, PagecastError, Provider, Result};
use crate::media::UploadedMedia;
use crate::platforms::{
    ContainerSpec, ContainerStatus, GraphApi, GraphObject, InstagramAccount, Visibility,
};
use crate::types::MediaKind;

pub struct GraphClient {
    client: reqwest::Client,
    graph_base: String,
    video_base: String,
}

impl GraphClient {
    pub fn new(config: &FacebookConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &FacebookConfig) -> Self {
        let version = config.api_version.trim_matches('/');
        Self {
            client,
            graph_base: format!("{}/{}", config.graph_url.trim_end_matches('/'), version),
            video_base: format!("{}/{}", config.video_url.trim_end_matches('/'), version),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.graph_base, path)
    }

    fn video_url(&self, path: &str) -> String {
        format!("{}/{}", self.video_base, path)
    }

    /// Send a request and classify any failure
    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::from_transport(Provider::Graph, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::from_transport(Provider::Graph, &e))?;

        let value: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) if !status.is_success() => Value::String(body),
            Err(e) => return Err(ApiError::malformed(Provider::Graph, e.to_string()).into()),
        };

        if !status.is_success() || value.get("error").is_some() {
            debug!(status = status.as_u16(), "Graph API returned an error");
            return Err(ApiError::from_graph_value(&value).into());
        }

        Ok(value)
    }

    fn source_part(media: &UploadedMedia) -> Result<Part> {
        Part::bytes(media.bytes()?)
            .file_name(media.upload_name())
            .mime_str(&media.mime_type)
            .map_err(|e| PagecastError::InvalidInput(format!("Invalid media type: {}", e)))
    }

    fn upload_form(
        media: &UploadedMedia,
        page_token: &SecretString,
        text_field: &'static str,
        text: Option<&str>,
        visibility: Visibility,
    ) -> Result<Form> {
        let mut form = Form::new()
            .part("source", Self::source_part(media)?)
            .text("access_token", page_token.expose_secret().to_string());

        if let Some(text) = text {
            form = form.text(text_field, text.to_string());
        }
        for (name, value) in visibility.form_fields() {
            form = form.text(name, value);
        }
        Ok(form)
    }
}

fn string_field(value: &Value, field: &str) -> Result<String> {
    match value.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ApiError::malformed(Provider::Graph, format!("missing '{}'", field)).into()),
    }
}

/// Largest rendition from a photo's `images` list
fn largest_image_source(value: &Value) -> Option<String> {
    value
        .get("images")?
        .as_array()?
        .iter()
        .filter_map(|image| {
            let source = image.get("source")?.as_str()?;
            let width = image.get("width").and_then(Value::as_u64).unwrap_or(0);
            let height = image.get("height").and_then(Value::as_u64).unwrap_or(0);
            Some((width * height, source))
        })
        .max_by_key(|(area, _)| *area)
        .map(|(_, source)| source.to_string())
}

#[async_trait]
impl GraphApi for GraphClient {
    #[instrument(skip(self, user_token))]
    async fn page_token(&self, page_id: &str, user_token: &SecretString) -> Result<SecretString> {
        let value = self
            .send(self.client.get(self.url(page_id)).query(&[
                ("fields", "access_token"),
                ("access_token", user_token.expose_secret()),
            ]))
            .await?;

        match value.get("access_token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => Ok(SecretString::from(token.to_string())),
            // Graph omits the field when the user does not manage the page
            _ => Err(ApiError::Permission {
                provider: Provider::Graph,
                message: "No page access token returned; the token lacks page permissions"
                    .to_string(),
            }
            .into()),
        }
    }

    #[instrument(skip(self, user_token))]
    async fn page_name(&self, page_id: &str, user_token: &SecretString) -> Result<String> {
        let value = self
            .send(self.client.get(self.url(page_id)).query(&[
                ("fields", "name"),
                ("access_token", user_token.expose_secret()),
            ]))
            .await?;
        string_field(&value, "name")
    }

    #[instrument(skip(self, user_token))]
    async fn instagram_account(
        &self,
        page_id: &str,
        user_token: &SecretString,
    ) -> Result<Option<InstagramAccount>> {
        let value = self
            .send(self.client.get(self.url(page_id)).query(&[
                ("fields", "instagram_business_account{id,username}"),
                ("access_token", user_token.expose_secret()),
            ]))
            .await?;

        match value.get("instagram_business_account") {
            None | Some(Value::Null) => Ok(None),
            Some(account) => serde_json::from_value(account.clone())
                .map(Some)
                .map_err(|e| ApiError::malformed(Provider::Graph, e.to_string()).into()),
        }
    }

    #[instrument(skip(self, page_token, media, caption))]
    async fn upload_photo(
        &self,
        page_id: &str,
        page_token: &SecretString,
        media: &UploadedMedia,
        caption: Option<&str>,
        visibility: Visibility,
    ) -> Result<GraphObject> {
        let form = Self::upload_form(media, page_token, "message", caption, visibility)?;
        let value = self
            .send(
                self.client
                    .post(self.url(&format!("{}/photos", page_id)))
                    .multipart(form),
            )
            .await?;

        Ok(GraphObject {
            id: string_field(&value, "id")?,
            post_id: value
                .get("post_id")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    #[instrument(skip(self, page_token, media, description))]
    async fn upload_video(
        &self,
        page_id: &str,
        page_token: &SecretString,
        media: &UploadedMedia,
        description: &str,
        visibility: Visibility,
    ) -> Result<GraphObject> {
        let form = Self::upload_form(media, page_token, "description", Some(description), visibility)?;
        let value = self
            .send(
                self.client
                    .post(self.video_url(&format!("{}/videos", page_id)))
                    .multipart(form),
            )
            .await?;

        Ok(GraphObject {
            id: string_field(&value, "id")?,
            post_id: None,
        })
    }

    #[instrument(skip(self, page_token, message), fields(attachments = attachment_ids.len()))]
    async fn create_feed_post(
        &self,
        page_id: &str,
        page_token: &SecretString,
        message: &str,
        attachment_ids: &[String],
        visibility: Visibility,
    ) -> Result<String> {
        let mut fields: Vec<(String, String)> = vec![("message".to_string(), message.to_string())];
        for (index, id) in attachment_ids.iter().enumerate() {
            fields.push((
                format!("attached_media[{}]", index),
                serde_json::json!({ "media_fbid": id }).to_string(),
            ));
        }
        fields.extend(
            visibility
                .form_fields()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value)),
        );
        fields.push((
            "access_token".to_string(),
            page_token.expose_secret().to_string(),
        ));

        let value = self
            .send(
                self.client
                    .post(self.url(&format!("{}/feed", page_id)))
                    .form(&fields),
            )
            .await?;
        string_field(&value, "id")
    }

    #[instrument(skip(self, page_token))]
    async fn media_url(
        &self,
        media_id: &str,
        kind: MediaKind,
        page_token: &SecretString,
    ) -> Result<String> {
        let field = match kind {
            MediaKind::Image => "images",
            MediaKind::Video => "source",
        };
        let value = self
            .send(self.client.get(self.url(media_id)).query(&[
                ("fields", field),
                ("access_token", page_token.expose_secret()),
            ]))
            .await?;

        let url = match kind {
            MediaKind::Image => largest_image_source(&value),
            MediaKind::Video => value.get("source").and_then(Value::as_str).map(str::to_string),
        };
        url.ok_or_else(|| {
            ApiError::malformed(Provider::Graph, format!("no public URL for media {}", media_id))
                .into()
        })
    }

    #[instrument(skip(self, page_token, spec))]
    async fn create_container(
        &self,
        instagram_id: &str,
        page_token: &SecretString,
        spec: &ContainerSpec,
    ) -> Result<String> {
        let mut fields = spec.form_fields();
        fields.push(("access_token", page_token.expose_secret().to_string()));

        let value = self
            .send(
                self.client
                    .post(self.url(&format!("{}/media", instagram_id)))
                    .form(&fields),
            )
            .await?;
        string_field(&value, "id")
    }

    #[instrument(skip(self, page_token))]
    async fn container_status(
        &self,
        container_id: &str,
        page_token: &SecretString,
    ) -> Result<ContainerStatus> {
        let value = self
            .send(self.client.get(self.url(container_id)).query(&[
                ("fields", "status_code"),
                ("access_token", page_token.expose_secret()),
            ]))
            .await?;
        Ok(ContainerStatus::parse(&string_field(&value, "status_code")?))
    }

    #[instrument(skip(self, page_token))]
    async fn publish_container(
        &self,
        instagram_id: &str,
        page_token: &SecretString,
        creation_id: &str,
    ) -> Result<String> {
        let value = self
            .send(
                self.client
                    .post(self.url(&format!("{}/media_publish", instagram_id)))
                    .form(&[
                        ("creation_id", creation_id),
                        ("access_token", page_token.expose_secret()),
                    ]),
            )
            .await?;
        string_field(&value, "id")
    }

    #[instrument(skip(self, page_token))]
    async fn republish(&self, post_id: &str, page_token: &SecretString) -> Result<()> {
        let value = self
            .send(self.client.post(self.url(post_id)).form(&[
                ("is_published", "true"),
                ("access_token", page_token.expose_secret()),
            ]))
            .await?;

        if value.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(ApiError::malformed(Provider::Graph, "republish reported success=false").into());
        }
        Ok(())
    }
}
