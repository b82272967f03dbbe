//! In-memory adapter supporting every operation

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Adapter, AdapterResult};
use crate::policy::{matches_filter, Rule};

/// Adapter keeping rules in process memory
///
/// Clones share storage, so a test can hold one handle while an enforcer
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    rules: Arc<RwLock<Vec<Rule>>>,
}

impl MemoryAdapter {
    /// Create an empty adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an adapter preloaded with `rules`
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self {
            rules: Arc::new(RwLock::new(rules)),
        }
    }

    /// Snapshot of the stored rules
    pub async fn rules(&self) -> Vec<Rule> {
        self.rules.read().await.clone()
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn load_policy(&self) -> AdapterResult<Vec<Rule>> {
        Ok(self.rules.read().await.clone())
    }

    async fn save_policy(&self, rules: &[Rule]) -> AdapterResult<()> {
        *self.rules.write().await = rules.to_vec();
        Ok(())
    }

    async fn add_policy(&self, ptype: &str, fields: &[String]) -> AdapterResult<()> {
        let rule = Rule::new(ptype, fields.iter().cloned());
        let mut rules = self.rules.write().await;
        if !rules.contains(&rule) {
            rules.push(rule);
        }
        Ok(())
    }

    async fn remove_policy(&self, ptype: &str, fields: &[String]) -> AdapterResult<()> {
        self.rules
            .write()
            .await
            .retain(|rule| !(rule.ptype == ptype && rule.fields == fields));
        Ok(())
    }

    async fn remove_filtered_policy(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> AdapterResult<()> {
        self.rules.write().await.retain(|rule| {
            !(rule.ptype == ptype && matches_filter(&rule.fields, field_index, field_values))
        });
        Ok(())
    }
}
