//! User-facing error messages
//!
//! Every error that reaches a person goes through [`translate`]. The mapping
//! is pure and total: any [`PagecastError`], including one classified from
//! arbitrary provider JSON, yields a non-empty string.

use crate::error::{ApiError, ContainerError, GenerationError, PagecastError, Provider};

/// Render an error as a single human-readable message
pub fn translate(error: &PagecastError) -> String {
    match error {
        PagecastError::Api(api) => translate_api(api),
        PagecastError::InvalidInput(message) => non_empty(message, "The request is not valid."),
        PagecastError::Generation(e) => translate_generation(e),
        PagecastError::Container(e) => translate_container(e),
        PagecastError::Config(e) => format!("Configuration problem: {}", e),
        PagecastError::Store(e) => format!("Could not read or write local data: {}", e),
        PagecastError::Task(e) => format!("A background task stopped unexpectedly: {}", e),
    }
}

/// Render a classified provider error
pub fn translate_api(error: &ApiError) -> String {
    match error {
        ApiError::Credential {
            provider: Provider::Graph,
            ..
        } => "Access token expired or invalid. Generate a new user access token in the Facebook \
              developer tools and connect again."
            .to_string(),
        ApiError::Credential {
            provider: Provider::GoogleAi,
            ..
        } => "The Google AI API key is not valid. Check the key and verify it again.".to_string(),

        ApiError::Permission {
            provider: Provider::Graph,
            ..
        } => "Posting failed: the access token lacks the \"pages_manage_posts\" permission. \
              Follow the Facebook connection instructions to grant it."
            .to_string(),
        ApiError::Permission {
            provider: Provider::GoogleAi,
            ..
        } => "The API key does not have access to the requested model.".to_string(),

        ApiError::NotFound {
            provider: Provider::Graph,
            ..
        } => "Page not found: the Page ID is wrong or does not match any page. Check the Page ID \
              under the page's About or Page Transparency section."
            .to_string(),
        ApiError::NotFound {
            provider: Provider::GoogleAi,
            message,
        } => format!(
            "The requested Google AI model or resource was not found{}",
            detail_suffix(message)
        ),

        ApiError::RateLimit {
            provider: Provider::Graph,
            ..
        } => "Too many requests: you connected or posted too often. Wait a few minutes \
              (about 5-10) and try again."
            .to_string(),
        ApiError::RateLimit {
            provider: Provider::GoogleAi,
            ..
        } => "The Google AI quota is used up. Try again later.".to_string(),

        ApiError::ContentBlocked { reason } => format!(
            "The content was blocked by the safety filter ({}). Adjust the text or media and try again.",
            non_empty(reason, "no reason given")
        ),

        ApiError::Transient {
            provider: Provider::Graph,
            ..
        } => "Could not reach Facebook or its response was unreadable. Check your connection and \
              try again."
            .to_string(),
        ApiError::Transient {
            provider: Provider::GoogleAi,
            ..
        } => "Google AI is unavailable or returned an unreadable response. Try again later."
            .to_string(),

        ApiError::Provider {
            provider,
            code,
            subcode,
            status,
            message,
        } => generic_provider_message(*provider, *code, *subcode, status.as_deref(), message),
    }
}

/// Summary line for a publish where Facebook succeeded but Instagram did not
pub fn partial_success(instagram_error: &PagecastError) -> String {
    format!(
        "Posted to Facebook, but Instagram failed: {}",
        translate(instagram_error)
    )
}

fn generic_provider_message(
    provider: Provider,
    code: Option<i64>,
    subcode: Option<i64>,
    status: Option<&str>,
    message: &str,
) -> String {
    let mut tags = Vec::new();
    if let Some(code) = code {
        tags.push(format!("code {}", code));
    }
    if let Some(subcode) = subcode {
        tags.push(format!("subcode {}", subcode));
    }
    if let Some(status) = status.filter(|s| !s.is_empty()) {
        tags.push(status.to_string());
    }

    let head = if tags.is_empty() {
        format!("{} error", provider)
    } else {
        format!("{} error ({})", provider, tags.join(", "))
    };

    if message.trim().is_empty() {
        if tags.is_empty() {
            format!("Unknown {} error. No details were returned.", provider)
        } else {
            format!("{}. No details were returned.", head)
        }
    } else {
        format!("{}: {}", head, message)
    }
}

fn translate_generation(error: &GenerationError) -> String {
    match error {
        GenerationError::EmptyResponse => {
            "The AI model returned no content. Adjust the prompt or media and try again.".to_string()
        }
        GenerationError::MissingVideo => {
            "Video generation finished but no video file was returned.".to_string()
        }
        GenerationError::Timeout { what, attempts } => format!(
            "{} is taking too long (no result after {} checks). Try again later.",
            what, attempts
        ),
        GenerationError::Download { status } => {
            format!("Could not download the video file (status {}).", status)
        }
    }
}

fn translate_container(error: &ContainerError) -> String {
    match error {
        ContainerError::Failed { status, .. } => format!(
            "Instagram could not process the media (status {}).",
            status
        ),
        ContainerError::Timeout { attempts, .. } => format!(
            "Instagram media processing timed out after {} checks.",
            attempts
        ),
    }
}

fn detail_suffix(message: &str) -> String {
    if message.trim().is_empty() {
        ".".to_string()
    } else {
        format!(": {}", message)
    }
}

fn non_empty(message: &str, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn graph_message(value: &Value) -> String {
        translate(&ApiError::from_graph_value(value).into())
    }

    fn gemini_message(value: &Value, http_status: Option<u16>) -> String {
        translate(&ApiError::from_gemini_value(value, http_status).into())
    }

    #[test]
    fn test_known_graph_codes_have_fixed_messages() {
        let token = graph_message(&json!({"error": {"code": 190, "message": "Session has expired"}}));
        assert!(token.starts_with("Access token expired or invalid"));

        let permission = graph_message(
            &json!({"error": {"code": 200, "message": "(#200) The user hasn't authorized the application to perform this action: Permission denied"}}),
        );
        assert!(permission.contains("pages_manage_posts"));

        let page = graph_message(&json!({"error": {"code": 803, "message": "Some of the aliases you requested do not exist"}}));
        assert!(page.starts_with("Page not found"));

        let limit = graph_message(&json!({"error": {"code": 10, "message": "limit"}}));
        assert!(limit.starts_with("Too many requests"));
    }

    #[test]
    fn test_code_200_without_permission_keeps_code() {
        let message = graph_message(&json!({"error": {"code": 200, "message": "Something else"}}));
        assert!(message.contains("code 200"));
        assert!(message.contains("Something else"));
    }

    #[test]
    fn test_unknown_codes_include_code_and_raw_text() {
        for code in [1, 2, 4, 100, 368, 1609005, -7] {
            let raw = format!("raw failure text {}", code);
            let message = graph_message(&json!({"error": {"code": code, "message": raw}}));
            assert!(message.contains(&code.to_string()), "{}", message);
            assert!(message.contains(&raw), "{}", message);
        }
    }

    #[test]
    fn test_subcode_is_preserved() {
        let message = graph_message(
            &json!({"error": {"code": 100, "error_subcode": 2207052, "message": "Media could not be fetched"}}),
        );
        assert!(message.contains("subcode 2207052"));
    }

    #[test]
    fn test_empty_object_has_fallback() {
        let message = graph_message(&json!({}));
        assert!(!message.is_empty());
        let message = gemini_message(&json!({}), None);
        assert!(!message.is_empty());
    }

    #[test]
    fn test_arbitrary_shapes_never_empty() {
        for value in [
            json!(null),
            json!(""),
            json!("network down"),
            json!(false),
            json!({"error": null}),
            json!({"error": {}}),
            json!({"error": {"message": ""}}),
            json!({"error": {"message": ["a", "b"], "code": 77}}),
        ] {
            assert!(!graph_message(&value).is_empty(), "{:?}", value);
            assert!(!gemini_message(&value, Some(400)).is_empty(), "{:?}", value);
        }
    }

    #[test]
    fn test_invalid_input_passes_through() {
        let error = PagecastError::InvalidInput("Schedule time must be in the future".to_string());
        assert_eq!(translate(&error), "Schedule time must be in the future");

        let empty = PagecastError::InvalidInput(String::new());
        assert!(!translate(&empty).is_empty());
    }

    #[test]
    fn test_gemini_messages() {
        let key = gemini_message(
            &json!({"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}),
            Some(400),
        );
        assert!(key.contains("API key is not valid"));

        let other = gemini_message(
            &json!({"error": {"code": 400, "message": "Unsupported MIME type", "status": "INVALID_ARGUMENT"}}),
            Some(400),
        );
        assert!(other.contains("Unsupported MIME type"));
        assert!(other.contains("INVALID_ARGUMENT"));
    }

    #[test]
    fn test_content_blocked_and_generation_errors() {
        let blocked = PagecastError::Api(ApiError::ContentBlocked {
            reason: "SAFETY".to_string(),
        });
        assert!(translate(&blocked).contains("SAFETY"));

        let empty = PagecastError::Generation(GenerationError::EmptyResponse);
        assert!(translate(&empty).contains("no content"));

        let download = PagecastError::Generation(GenerationError::Download { status: 403 });
        assert!(translate(&download).contains("403"));
    }

    #[test]
    fn test_partial_success_names_instagram() {
        let error = PagecastError::Container(ContainerError::Failed {
            container_id: "17890".to_string(),
            status: "ERROR".to_string(),
        });
        let message = partial_success(&error);
        assert!(message.starts_with("Posted to Facebook"));
        assert!(message.contains("Instagram failed"));
        assert!(message.contains("ERROR"));
    }
}
