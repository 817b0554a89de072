//! Theme and saved API key

use secrecy::{ExposeSecret, SecretString};

use crate::error::Result;
use crate::store::{Store, API_KEY_KEY, THEME_KEY};
use crate::types::Theme;

#[derive(Clone)]
pub struct Preferences {
    store: Store,
}

impl Preferences {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn theme(&self) -> Result<Theme> {
        Ok(self.store.get_json(THEME_KEY).await?.unwrap_or_default())
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<()> {
        self.store.set_json(THEME_KEY, &theme).await
    }

    /// Flip between light and dark, returning the new theme
    pub async fn toggle_theme(&self) -> Result<Theme> {
        let next = match self.theme().await? {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        };
        self.set_theme(next).await?;
        Ok(next)
    }

    pub async fn api_key(&self) -> Result<Option<SecretString>> {
        let key: Option<String> = self.store.get_json(API_KEY_KEY).await?;
        Ok(key.filter(|k| !k.trim().is_empty()).map(SecretString::from))
    }

    /// Store a key that has already been verified
    pub async fn set_api_key(&self, key: &SecretString) -> Result<()> {
        self.store.set_json(API_KEY_KEY, key.expose_secret()).await
    }

    pub async fn clear_api_key(&self) -> Result<bool> {
        self.store.delete(API_KEY_KEY).await
    }
}
