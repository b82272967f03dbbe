//! Read-only adapter over a fixed policy string

use async_trait::async_trait;

use super::{parse_policy_text, Adapter, AdapterResult};
use crate::error::AdapterError;
use crate::policy::Rule;

/// Adapter backed by newline-separated policy text
///
/// Only [`Adapter::load_policy`] succeeds; every mutating call reports
/// [`AdapterError::NotSupported`].
#[derive(Debug, Clone, Default)]
pub struct StringAdapter {
    text: String,
}

impl StringAdapter {
    /// Create an adapter over `text`
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl Adapter for StringAdapter {
    async fn load_policy(&self) -> AdapterResult<Vec<Rule>> {
        parse_policy_text(&self.text)
    }

    async fn save_policy(&self, _rules: &[Rule]) -> AdapterResult<()> {
        Err(AdapterError::NotSupported("save_policy"))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_and_reject_mutations() {
        let adapter = StringAdapter::new("p, alice, data1, read\ng, alice, admin");

        let rules = adapter.load_policy().await.unwrap();
        assert_eq!(rules.len(), 2);
        assert!(!adapter.supports_mutation());

        let fields = vec!["bob".to_string(), "data2".to_string(), "write".to_string()];
        assert!(adapter.add_policy("p", &fields).await.unwrap_err().is_not_supported());
        assert!(adapter.remove_policy("p", &fields).await.unwrap_err().is_not_supported());
        assert!(adapter
            .remove_filtered_policy("p", 0, &fields[..1])
            .await
            .unwrap_err()
            .is_not_supported());
        assert!(adapter.save_policy(&rules).await.unwrap_err().is_not_supported());
    }

    #[tokio::test]
    async fn test_empty_string_loads_nothing() {
        let adapter = StringAdapter::default();
        assert!(adapter.load_policy().await.unwrap().is_empty());
    }
}
