//! Policy file adapter

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{parse_policy_text, render_policy_text, Adapter, AdapterResult};
use crate::error::AdapterError;
use crate::policy::Rule;

/// Adapter over a line-oriented policy file
///
/// The whole file is read on load and rewritten on save. Single-rule
/// mutations are not mirrored; call [`Adapter::save_policy`] to persist them.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    path: PathBuf,
}

impl FileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Adapter for FileAdapter {
    async fn load_policy(&self) -> AdapterResult<Vec<Rule>> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let rules = parse_policy_text(&text)?;
        info!("Loaded {} rules from {}", rules.len(), self.path.display());
        Ok(rules)
    }

    async fn save_policy(&self, rules: &[Rule]) -> AdapterResult<()> {
        tokio::fs::write(&self.path, render_policy_text(rules)).await?;
        info!("Saved {} rules to {}", rules.len(), self.path.display());
        Ok(())
    }

    async fn add_policy(&self, _ptype: &str, _fields: &[String]) -> AdapterResult<()> {
        Err(AdapterError::NotSupported("add_policy"))
    }

    async fn add_policies(&self, _ptype: &str, _rules: &[Vec<String>]) -> AdapterResult<()> {
        Err(AdapterError::NotSupported("add_policies"))
    }

    async fn remove_policy(&self, _ptype: &str, _fields: &[String]) -> AdapterResult<()> {
        Err(AdapterError::NotSupported("remove_policy"))
    }

    async fn remove_filtered_policy(
        &self,
        _ptype: &str,
        _field_index: usize,
        _field_values: &[String],
    ) -> AdapterResult<()> {
        Err(AdapterError::NotSupported("remove_filtered_policy"))
    }

    fn supports_mutation(&self) -> bool {
        false
    }
}
