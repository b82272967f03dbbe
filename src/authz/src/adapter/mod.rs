//! Policy storage adapters
//!
//! An adapter loads the full rule set at startup or reload, saves it back on
//! request, and optionally mirrors individual mutations. Adapters that cannot
//! mutate report [`AdapterError::NotSupported`] instead of silently ignoring
//! the call.

pub mod file;
pub mod memory;
pub mod string;

pub use file::FileAdapter;
pub use memory::MemoryAdapter;
pub use string::StringAdapter;

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::policy::Rule;

/// Result type for adapter operations
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Policy storage backend
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Load every stored rule
    async fn load_policy(&self) -> AdapterResult<Vec<Rule>>;

    /// Replace the stored rule set with `rules`
    async fn save_policy(&self, rules: &[Rule]) -> AdapterResult<()>;

    /// Persist one added rule
    async fn add_policy(&self, ptype: &str, fields: &[String]) -> AdapterResult<()>;

    /// Persist several added rules
    async fn add_policies(&self, ptype: &str, rules: &[Vec<String>]) -> AdapterResult<()> {
        for fields in rules {
            self.add_policy(ptype, fields).await?;
        }
        Ok(())
    }

    /// Persist one removed rule
    async fn remove_policy(&self, ptype: &str, fields: &[String]) -> AdapterResult<()>;

    /// Persist a filtered removal
    async fn remove_filtered_policy(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> AdapterResult<()>;

    /// Whether single-rule mutations are supported
    fn supports_mutation(&self) -> bool {
        true
    }
}

/// Parse one policy line: `ptype, field, field, ...`
///
/// Blank lines and `#` comments yield `None`. Fields are trimmed.
pub fn load_policy_line(line: &str) -> Option<Rule> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut tokens = line.split(',').map(str::trim);
    let ptype = tokens.next()?;
    if ptype.is_empty() {
        return None;
    }

    Some(Rule::new(ptype, tokens))
}

/// Parse newline-separated policy text
///
/// # Errors
/// Returns `AdapterError::Parse` for a line with a type but no fields
pub fn parse_policy_text(text: &str) -> AdapterResult<Vec<Rule>> {
    let mut rules = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if let Some(rule) = load_policy_line(line) {
            if rule.fields.is_empty() {
                return Err(AdapterError::Parse {
                    line: index + 1,
                    reason: format!("rule '{}' has no fields", rule.ptype),
                });
            }
            rules.push(rule);
        }
    }
    Ok(rules)
}

/// Render rules as policy text, one rule per line
pub fn render_policy_text(rules: &[Rule]) -> String {
    rules.iter().map(|rule| format!("{}\n", rule)).collect()
}
