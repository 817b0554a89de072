//! Error types for Pagecast
//!
//! Provider failures are classified exactly once, at the HTTP boundary, into
//! [`ApiError`]. Everything above the platform clients matches on the variant
//! and never inspects raw JSON again. User-facing text is produced in
//! [`crate::translate`].

use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PagecastError>;

#[derive(Error, Debug)]
pub enum PagecastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Instagram container error: {0}")]
    Container(#[from] ContainerError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl PagecastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PagecastError::InvalidInput(_) => 3,
            PagecastError::Api(ApiError::Credential { .. })
            | PagecastError::Api(ApiError::Permission { .. }) => 2,
            PagecastError::Api(_) => 1,
            PagecastError::Generation(_) => 1,
            PagecastError::Container(_) => 1,
            PagecastError::Config(_) => 1,
            PagecastError::Store(_) => 1,
            PagecastError::Task(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Stored value for '{key}' is not valid JSON: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// External service an [`ApiError`] originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Facebook Graph API (also serves the Instagram publishing endpoints)
    Graph,
    /// Google Generative Language API
    GoogleAi,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Graph => write!(f, "Facebook"),
            Provider::GoogleAi => write!(f, "Google AI"),
        }
    }
}

/// Classified failure from an external API
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("{provider} credential rejected: {message}")]
    Credential { provider: Provider, message: String },

    #[error("{provider} permission denied: {message}")]
    Permission { provider: Provider, message: String },

    #[error("{provider} target not found: {message}")]
    NotFound { provider: Provider, message: String },

    #[error("{provider} rate limit exceeded: {message}")]
    RateLimit { provider: Provider, message: String },

    #[error("Content blocked by safety filter: {reason}")]
    ContentBlocked { reason: String },

    #[error("{provider} unreachable or malformed response: {message}")]
    Transient { provider: Provider, message: String },

    #[error("{provider} error (code {code:?}, subcode {subcode:?}, status {status:?}): {message}")]
    Provider {
        provider: Provider,
        code: Option<i64>,
        subcode: Option<i64>,
        status: Option<String>,
        message: String,
    },
}

// Graph API error codes with dedicated handling
const GRAPH_INVALID_TOKEN: i64 = 190;
const GRAPH_PERMISSION: i64 = 200;
const GRAPH_PAGE_NOT_FOUND: i64 = 803;
const GRAPH_API_LIMIT: i64 = 10;

impl ApiError {
    /// Classify a Graph API error body
    ///
    /// Accepts the full `{"error": {...}}` envelope, the inner object, a bare
    /// string, or anything else. Never panics.
    pub fn from_graph_value(value: &Value) -> Self {
        let fields = ErrorFields::extract(value);
        let provider = Provider::Graph;

        match fields.code {
            Some(GRAPH_INVALID_TOKEN) => ApiError::Credential {
                provider,
                message: fields.message,
            },
            Some(GRAPH_PERMISSION) if fields.message.to_lowercase().contains("permission") => {
                ApiError::Permission {
                    provider,
                    message: fields.message,
                }
            }
            Some(GRAPH_PAGE_NOT_FOUND) => ApiError::NotFound {
                provider,
                message: fields.message,
            },
            Some(GRAPH_API_LIMIT) => ApiError::RateLimit {
                provider,
                message: fields.message,
            },
            _ => ApiError::Provider {
                provider,
                code: fields.code,
                subcode: fields.subcode,
                status: fields.status,
                message: fields.message,
            },
        }
    }

    /// Classify a Generative Language API error body
    ///
    /// `http_status` is the response status when one was received; the body's
    /// own `code` takes precedence when present.
    pub fn from_gemini_value(value: &Value, http_status: Option<u16>) -> Self {
        let fields = ErrorFields::extract(value);
        let provider = Provider::GoogleAi;
        let code = fields.code.or(http_status.map(i64::from));
        let status = fields.status.clone().unwrap_or_default();

        if fields.message.contains("API key not valid")
            || status == "UNAUTHENTICATED"
            || code == Some(401)
        {
            return ApiError::Credential {
                provider,
                message: fields.message,
            };
        }
        if status == "RESOURCE_EXHAUSTED" || code == Some(429) {
            return ApiError::RateLimit {
                provider,
                message: fields.message,
            };
        }
        if status == "PERMISSION_DENIED" || code == Some(403) {
            return ApiError::Permission {
                provider,
                message: fields.message,
            };
        }
        if status == "NOT_FOUND" || code == Some(404) {
            return ApiError::NotFound {
                provider,
                message: fields.message,
            };
        }
        if status == "INTERNAL" || status == "UNAVAILABLE" || code.is_some_and(|c| c >= 500) {
            return ApiError::Transient {
                provider,
                message: fields.message,
            };
        }

        ApiError::Provider {
            provider,
            code,
            subcode: fields.subcode,
            status: fields.status,
            message: fields.message,
        }
    }

    /// Classify a transport-level failure (connect, timeout, body decode)
    pub fn from_transport(provider: Provider, error: &reqwest::Error) -> Self {
        ApiError::Transient {
            provider,
            message: error.to_string(),
        }
    }

    /// Response body that could not be understood
    pub fn malformed(provider: Provider, detail: impl Into<String>) -> Self {
        ApiError::Transient {
            provider,
            message: format!("Malformed response: {}", detail.into()),
        }
    }

    pub fn provider(&self) -> Option<Provider> {
        match self {
            ApiError::Credential { provider, .. }
            | ApiError::Permission { provider, .. }
            | ApiError::NotFound { provider, .. }
            | ApiError::RateLimit { provider, .. }
            | ApiError::Transient { provider, .. }
            | ApiError::Provider { provider, .. } => Some(*provider),
            ApiError::ContentBlocked { .. } => None,
        }
    }
}

/// Loosely-typed view over the error envelopes both providers return
struct ErrorFields {
    code: Option<i64>,
    subcode: Option<i64>,
    status: Option<String>,
    message: String,
}

impl ErrorFields {
    fn extract(value: &Value) -> Self {
        if let Value::String(s) = value {
            return Self {
                code: None,
                subcode: None,
                status: None,
                message: s.clone(),
            };
        }

        let body = match value.get("error") {
            Some(inner) if inner.is_object() => inner,
            Some(Value::String(s)) => {
                return Self {
                    code: None,
                    subcode: None,
                    status: None,
                    message: s.clone(),
                }
            }
            _ => value,
        };

        let message = match body.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        Self {
            code: body.get("code").and_then(lenient_i64),
            subcode: body.get("error_subcode").and_then(lenient_i64),
            status: body
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string),
            message,
        }
    }
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Video generation finished without a video URI")]
    MissingVideo,

    #[error("{what} did not finish after {attempts} polls")]
    Timeout { what: String, attempts: u32 },

    #[error("Video download failed with HTTP status {status}")]
    Download { status: u16 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContainerError {
    #[error("container {container_id} reported status {status}")]
    Failed { container_id: String, status: String },

    #[error("container {container_id} not finished after {attempts} polls")]
    Timeout { container_id: String, attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = PagecastError::InvalidInput("Empty caption".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_credential_and_permission() {
        let credential = PagecastError::Api(ApiError::Credential {
            provider: Provider::Graph,
            message: "expired".to_string(),
        });
        assert_eq!(credential.exit_code(), 2);

        let permission = PagecastError::Api(ApiError::Permission {
            provider: Provider::GoogleAi,
            message: "denied".to_string(),
        });
        assert_eq!(permission.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_failures() {
        let rate = PagecastError::Api(ApiError::RateLimit {
            provider: Provider::Graph,
            message: "slow down".to_string(),
        });
        assert_eq!(rate.exit_code(), 1);

        let generation = PagecastError::Generation(GenerationError::EmptyResponse);
        assert_eq!(generation.exit_code(), 1);

        let container = PagecastError::Container(ContainerError::Timeout {
            container_id: "1".to_string(),
            attempts: 24,
        });
        assert_eq!(container.exit_code(), 1);

        let config = PagecastError::Config(ConfigError::MissingField("facebook.page_id".into()));
        assert_eq!(config.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_invalid_input() {
        let error = PagecastError::InvalidInput("Caption cannot be empty".to_string());
        assert_eq!(error.to_string(), "Invalid input: Caption cannot be empty");
    }

    #[test]
    fn test_graph_envelope_classification() {
        let body = json!({"error": {"message": "Error validating access token", "type": "OAuthException", "code": 190, "error_subcode": 463}});
        assert!(matches!(
            ApiError::from_graph_value(&body),
            ApiError::Credential { provider: Provider::Graph, .. }
        ));

        let body = json!({"error": {"message": "(#200) Requires pages_manage_posts permission", "code": 200}});
        assert!(matches!(ApiError::from_graph_value(&body), ApiError::Permission { .. }));

        let body = json!({"error": {"message": "Page not found", "code": 803}});
        assert!(matches!(ApiError::from_graph_value(&body), ApiError::NotFound { .. }));

        let body = json!({"error": {"message": "Application request limit reached", "code": 10}});
        assert!(matches!(ApiError::from_graph_value(&body), ApiError::RateLimit { .. }));
    }

    #[test]
    fn test_graph_code_200_without_permission_is_generic() {
        let body = json!({"error": {"message": "Duplicate status message", "code": 200}});
        match ApiError::from_graph_value(&body) {
            ApiError::Provider { code, message, .. } => {
                assert_eq!(code, Some(200));
                assert_eq!(message, "Duplicate status message");
            }
            other => panic!("Expected generic provider error, got {:?}", other),
        }
    }

    #[test]
    fn test_graph_unknown_code_keeps_raw_fields() {
        let body = json!({"error": {"message": "Invalid parameter", "code": 100, "error_subcode": 1487}});
        assert_eq!(
            ApiError::from_graph_value(&body),
            ApiError::Provider {
                provider: Provider::Graph,
                code: Some(100),
                subcode: Some(1487),
                status: None,
                message: "Invalid parameter".to_string(),
            }
        );
    }

    #[test]
    fn test_graph_odd_shapes_do_not_panic() {
        for value in [
            json!({}),
            json!(null),
            json!("plain text failure"),
            json!(42),
            json!([1, 2, 3]),
            json!({"error": "string error"}),
            json!({"code": "190", "message": "flat"}),
            json!({"error": {"message": {"nested": true}, "code": 1}}),
        ] {
            let _ = ApiError::from_graph_value(&value);
        }

        // Flat shape with a stringly-typed code still classifies
        let flat = json!({"code": "190", "message": "flat"});
        assert!(matches!(ApiError::from_graph_value(&flat), ApiError::Credential { .. }));
    }

    #[test]
    fn test_graph_non_string_message_is_serialized() {
        let body = json!({"error": {"message": {"detail": "x"}, "code": 1}});
        match ApiError::from_graph_value(&body) {
            ApiError::Provider { message, .. } => assert!(message.contains("detail")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_gemini_classification() {
        let invalid_key = json!({"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}});
        assert!(matches!(
            ApiError::from_gemini_value(&invalid_key, Some(400)),
            ApiError::Credential { provider: Provider::GoogleAi, .. }
        ));

        let quota = json!({"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}});
        assert!(matches!(ApiError::from_gemini_value(&quota, Some(429)), ApiError::RateLimit { .. }));

        let denied = json!({"error": {"code": 403, "message": "denied", "status": "PERMISSION_DENIED"}});
        assert!(matches!(ApiError::from_gemini_value(&denied, Some(403)), ApiError::Permission { .. }));

        let internal = json!({"error": {"code": 500, "message": "oops", "status": "INTERNAL"}});
        assert!(matches!(ApiError::from_gemini_value(&internal, Some(500)), ApiError::Transient { .. }));
    }

    #[test]
    fn test_gemini_falls_back_to_http_status() {
        let value = json!({});
        assert!(matches!(
            ApiError::from_gemini_value(&value, Some(429)),
            ApiError::RateLimit { .. }
        ));
        assert!(matches!(
            ApiError::from_gemini_value(&value, Some(503)),
            ApiError::Transient { .. }
        ));
        assert!(matches!(
            ApiError::from_gemini_value(&value, None),
            ApiError::Provider { code: None, .. }
        ));
    }

    #[test]
    fn test_api_error_provider() {
        let blocked = ApiError::ContentBlocked {
            reason: "SAFETY".to_string(),
        };
        assert_eq!(blocked.provider(), None);

        let transient = ApiError::malformed(Provider::Graph, "missing id");
        assert_eq!(transient.provider(), Some(Provider::Graph));
        assert!(transient.to_string().contains("missing id"));
    }

    #[test]
    fn test_error_conversion_from_api_error() {
        let api = ApiError::NotFound {
            provider: Provider::Graph,
            message: "gone".to_string(),
        };
        let error: PagecastError = api.clone().into();
        assert!(matches!(error, PagecastError::Api(ref inner) if *inner == api));
    }

    #[test]
    fn test_config_error_read_error_formatting() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let config_error = ConfigError::ReadError(io_error);
        assert!(config_error.to_string().contains("Failed to read config file"));
    }
}
