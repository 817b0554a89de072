//! Page and Instagram connection checks

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::error::{ApiError, PagecastError, Provider, Result};
use crate::platforms::{GraphApi, InstagramAccount};

#[derive(Clone)]
pub struct ConnectionService {
    graph: Arc<dyn GraphApi>,
}

impl ConnectionService {
    pub fn new(graph: Arc<dyn GraphApi>) -> Self {
        Self { graph }
    }

    /// Name of the page, proving the id and token work together
    pub async fn verify_page(&self, page_id: &str, user_token: &SecretString) -> Result<String> {
        check_inputs(page_id, user_token)?;
        let name = self.graph.page_name(page_id.trim(), user_token).await?;
        info!(page = %name, "Facebook page connected");
        Ok(name)
    }

    /// Instagram business account linked to the page
    pub async fn verify_instagram(
        &self,
        page_id: &str,
        user_token: &SecretString,
    ) -> Result<InstagramAccount> {
        check_inputs(page_id, user_token)?;
        let account = self
            .graph
            .instagram_account(page_id.trim(), user_token)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                provider: Provider::Graph,
                message: "No Instagram business account is connected to this page".to_string(),
            })?;
        info!(account = %account.id, "Instagram account connected");
        Ok(account)
    }
}

fn check_inputs(page_id: &str, user_token: &SecretString) -> Result<()> {
    if page_id.trim().is_empty() {
        return Err(PagecastError::InvalidInput("Enter a Facebook Page ID".to_string()));
    }
    if user_token.expose_secret().trim().is_empty() {
        return Err(PagecastError::InvalidInput(
            "Enter a Facebook user access token".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{GraphCall, MockGraph};

    fn token() -> SecretString {
        SecretString::from("user".to_string())
    }

    #[tokio::test]
    async fn test_verify_page_returns_name() {
        let graph = Arc::new(MockGraph::new().with_page_name("Lavender Corner"));
        let name = ConnectionService::new(graph.clone())
            .verify_page(" 123 ", &token())
            .await
            .unwrap();
        assert_eq!(name, "Lavender Corner");
        assert_eq!(graph.calls(), vec![GraphCall::PageName { page_id: "123".into() }]);
    }

    #[tokio::test]
    async fn test_missing_inputs_make_no_call() {
        let graph = Arc::new(MockGraph::new());
        let service = ConnectionService::new(graph.clone());

        assert_eq!(service.verify_page("", &token()).await.unwrap_err().exit_code(), 3);
        let blank = SecretString::from(String::new());
        assert_eq!(service.verify_instagram("123", &blank).await.unwrap_err().exit_code(), 3);
        assert_eq!(graph.call_count(), 0);
    }

    #[tokio::test]
    async fn test_verify_instagram() {
        let graph = Arc::new(MockGraph::new());
        let account = ConnectionService::new(graph)
            .verify_instagram("123", &token())
            .await
            .unwrap();
        assert_eq!(account.id, "ig_mock");
        assert_eq!(account.username.as_deref(), Some("mockshop"));
    }

    #[tokio::test]
    async fn test_verify_instagram_not_linked() {
        let graph = Arc::new(MockGraph::new().without_instagram());
        let err = ConnectionService::new(graph)
            .verify_instagram("123", &token())
            .await
            .unwrap_err();
        assert!(matches!(err, PagecastError::Api(ApiError::NotFound { .. })));
    }
}
