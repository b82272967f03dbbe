//! In-memory policy store
//!
//! Rules are grouped by rule type ("p", "p2", "g", ...) and kept in insertion
//! order. A rule's identity is its exact `(type, fields)` pair.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// One policy rule: a rule type tag plus its ordered fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    /// Rule type (e.g. "p" or "g")
    pub ptype: String,

    /// Field values, meaning defined by the model
    pub fields: Vec<String>,
}

impl Rule {
    /// Create a new rule
    pub fn new<S: Into<String>>(ptype: impl Into<String>, fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            ptype: ptype.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Section this rule belongs to ("p" or "g"), taken from the first character of its type
    pub fn section(&self) -> &str {
        self.ptype.get(..1).unwrap_or_default()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ptype)?;
        for field in &self.fields {
            write!(f, ", {}", field)?;
        }
        Ok(())
    }
}

/// Ordered rules of one type plus a membership index
#[derive(Debug, Clone, Default)]
struct RuleSet {
    ordered: Vec<Vec<String>>,
    index: HashSet<Vec<String>>,
}

/// Whether `fields` matches every non-empty value positionally from `field_index`
pub(crate) fn matches_filter(fields: &[String], field_index: usize, field_values: &[String]) -> bool {
    field_values.iter().enumerate().all(|(offset, value)| {
        value.is_empty()
            || fields
                .get(field_index + offset)
                .is_some_and(|field| field == value)
    })
}

/// In-memory policy store
///
/// Never fails: absence is reported through `false` or empty results.
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    rules: BTreeMap<String, RuleSet>,
}

impl PolicyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule; returns `false` if an identical rule is already present
    pub fn add_rule(&mut self, ptype: &str, fields: Vec<String>) -> bool {
        let set = self.rules.entry(ptype.to_string()).or_default();
        if !set.index.insert(fields.clone()) {
            return false;
        }
        set.ordered.push(fields);
        true
    }

    /// Add several rules, returning only those that were not present yet
    pub fn add_rules(&mut self, ptype: &str, rules: Vec<Vec<String>>) -> Vec<Vec<String>> {
        rules
            .into_iter()
            .filter(|fields| self.add_rule(ptype, fields.clone()))
            .collect()
    }

    /// Remove a rule; returns `false` if it was absent
    pub fn remove_rule(&mut self, ptype: &str, fields: &[String]) -> bool {
        let Some(set) = self.rules.get_mut(ptype) else {
            return false;
        };
        if !set.index.remove(fields) {
            return false;
        }
        set.ordered.retain(|rule| rule.as_slice() != fields);
        true
    }

    /// Remove every rule of `ptype` whose fields match `field_values` starting at `field_index`.
    ///
    /// Empty values act as wildcards. Returns the removed rules, in store order.
    pub fn remove_filtered_rules(
        &mut self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Vec<Vec<String>> {
        let Some(set) = self.rules.get_mut(ptype) else {
            return Vec::new();
        };

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut set.ordered)
            .into_iter()
            .partition(|fields| matches_filter(fields, field_index, field_values));

        for fields in &removed {
            set.index.remove(fields);
        }
        set.ordered = kept;
        removed
    }

    /// Whether an identical rule exists
    pub fn has_rule(&self, ptype: &str, fields: &[String]) -> bool {
        self.rules
            .get(ptype)
            .is_some_and(|set| set.index.contains(fields))
    }

    /// Rules of `ptype` in insertion order
    pub fn get_rules(&self, ptype: &str) -> &[Vec<String>] {
        self.rules
            .get(ptype)
            .map(|set| set.ordered.as_slice())
            .unwrap_or_default()
    }

    /// Rules of `ptype` matching a positional filter
    pub fn get_filtered_rules(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Vec<Vec<String>> {
        self.get_rules(ptype)
            .iter()
            .filter(|fields| matches_filter(fields, field_index, field_values))
            .cloned()
            .collect()
    }

    /// Distinct values at `field_index` across all rules of `ptype`, in first-seen order
    pub fn get_values_for_field(&self, ptype: &str, field_index: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        self.get_rules(ptype)
            .iter()
            .filter_map(|fields| fields.get(field_index))
            .filter(|value| seen.insert(value.as_str()))
            .cloned()
            .collect()
    }

    /// Rule types currently holding at least one rule
    pub fn ptypes(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(|(_, set)| !set.ordered.is_empty())
            .map(|(ptype, _)| ptype.as_str())
    }

    /// Every rule as `Rule` values, grouped by type
    pub fn to_rules(&self) -> Vec<Rule> {
        self.rules
            .iter()
            .flat_map(|(ptype, set)| {
                set.ordered.iter().map(move |fields| Rule {
                    ptype: ptype.clone(),
                    fields: fields.clone(),
                })
            })
            .collect()
    }

    /// Total number of rules
    pub fn len(&self) -> usize {
        self.rules.values().map(|set| set.ordered.len()).sum()
    }

    /// Whether the store holds no rules
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every rule
    pub fn clear(&mut self) {
        self.rules.clear();
    }
}
