//! Saved caption templates

use tracing::debug;

use crate::error::{PagecastError, Result};
use crate::prompts::default_templates;
use crate::store::{Store, TEMPLATES_KEY};
use crate::types::PromptTemplate;

#[derive(Clone)]
pub struct TemplateService {
    store: Store,
}

impl TemplateService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Saved templates, or the built-in set when nothing was saved yet
    pub async fn list(&self) -> Result<Vec<PromptTemplate>> {
        Ok(self
            .store
            .get_json(TEMPLATES_KEY)
            .await?
            .unwrap_or_else(default_templates))
    }

    pub async fn find(&self, name: &str) -> Result<Option<PromptTemplate>> {
        let templates = self.list().await?;
        Ok(templates
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name.trim())))
    }

    /// Add a template, replacing any existing one with the same name
    pub async fn save(&self, template: PromptTemplate) -> Result<Vec<PromptTemplate>> {
        let name = template.name.trim();
        if name.is_empty() || template.value.trim().is_empty() {
            return Err(PagecastError::InvalidInput(
                "A template needs both a name and instructions".to_string(),
            ));
        }
        let template = PromptTemplate::new(name, template.value.trim());

        let mut templates = self.list().await?;
        match templates
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(&template.name))
        {
            Some(existing) => *existing = template,
            None => templates.push(template),
        }
        self.store.set_json(TEMPLATES_KEY, &templates).await?;
        Ok(templates)
    }

    /// Remove by name; returns whether anything was removed
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let mut templates = self.list().await?;
        let before = templates.len();
        templates.retain(|t| !t.name.eq_ignore_ascii_case(name.trim()));
        if templates.len() == before {
            return Ok(false);
        }
        self.store.set_json(TEMPLATES_KEY, &templates).await?;
        Ok(true)
    }

    /// Drop the saved list so the defaults apply again
    pub async fn reset(&self) -> Result<Vec<PromptTemplate>> {
        self.store.delete(TEMPLATES_KEY).await?;
        debug!("Templates reset to defaults");
        Ok(default_templates())
    }
}
