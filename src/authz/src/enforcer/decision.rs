//! Decision types returned by the enforcer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one enforcement call with the rule that decided it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique decision ID
    pub id: String,

    /// Whether the request is allowed
    pub allowed: bool,

    /// Fields of the deciding policy rule, when a single rule decided
    pub rule: Option<Vec<String>>,

    /// Position of the deciding rule in policy store order
    pub rule_index: Option<usize>,

    /// Whether the decision came from the decision cache
    #[serde(default)]
    pub cached: bool,

    /// When the decision was made
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    pub(crate) fn new(allowed: bool, rule: Option<Vec<String>>, rule_index: Option<usize>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            allowed,
            rule,
            rule_index,
            cached: false,
            timestamp: Utc::now(),
        }
    }
}

/// Which request, policy, effect and matcher definitions an enforcement uses
///
/// The default selects `r`, `p`, `e` and `m`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnforceContext {
    pub r: String,
    pub p: String,
    pub e: String,
    pub m: String,
}

impl EnforceContext {
    /// Context selecting numbered definitions, e.g. `"2"` for `r2`, `p2`, `e2`, `m2`
    pub fn with_suffix(suffix: &str) -> Self {
        Self {
            r: format!("r{}", suffix),
            p: format!("p{}", suffix),
            e: format!("e{}", suffix),
            m: format!("m{}", suffix),
        }
    }
}

impl Default for EnforceContext {
    fn default() -> Self {
        Self::with_suffix("")
    }
}
