//! Policy management API: query and mutate `p` and `g` rules
//!
//! Unnamed methods operate on `p` (policy) or `g` (grouping); `named`
//! variants take the rule type explicitly. Every mutation returns whether the
//! store changed.

use super::Enforcer;
use crate::error::{AuthzError, Result};

const POLICY: &str = "p";
const GROUPING: &str = "g";

pub(crate) fn owned<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values.iter().map(|v| v.as_ref().to_string()).collect()
}

impl Enforcer {
    fn require_policy_type(&self, ptype: &str) -> Result<()> {
        if self.model().policy_tokens(ptype).is_none() {
            return Err(AuthzError::InvalidPolicy(format!("'{}' is not a policy type", ptype)));
        }
        Ok(())
    }

    fn require_grouping_type(&self, ptype: &str) -> Result<()> {
        if !self.model().is_grouping(ptype) {
            return Err(AuthzError::InvalidPolicy(format!("'{}' is not a grouping type", ptype)));
        }
        Ok(())
    }

    /// Index of a policy field by name, e.g. `obj`, falling back to `default`
    fn policy_field_index(&self, token: &str, default: usize) -> usize {
        self.model()
            .policy_tokens(POLICY)
            .and_then(|tokens| tokens.iter().position(|t| t == token))
            .unwrap_or(default)
    }

    // Queries

    /// All `p` rules
    pub fn get_policy(&self) -> Vec<Vec<String>> {
        self.get_named_policy(POLICY)
    }

    /// All rules of `ptype`, in store order
    pub fn get_named_policy(&self, ptype: &str) -> Vec<Vec<String>> {
        self.with_store(|store| store.get_rules(ptype).to_vec())
    }

    /// `p` rules matching `field_values` from `field_index`; empty values match anything
    pub fn get_filtered_policy<S: AsRef<str>>(&self, field_index: usize, field_values: &[S]) -> Vec<Vec<String>> {
        self.get_filtered_named_policy(POLICY, field_index, field_values)
    }

    pub fn get_filtered_named_policy<S: AsRef<str>>(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[S],
    ) -> Vec<Vec<String>> {
        let values = owned(field_values);
        self.with_store(|store| store.get_filtered_rules(ptype, field_index, &values))
    }

    /// All `g` rules
    pub fn get_grouping_policy(&self) -> Vec<Vec<String>> {
        self.get_named_policy(GROUPING)
    }

    pub fn get_filtered_grouping_policy<S: AsRef<str>>(
        &self,
        field_index: usize,
        field_values: &[S],
    ) -> Vec<Vec<String>> {
        self.get_filtered_named_policy(GROUPING, field_index, field_values)
    }

    pub fn has_policy<S: AsRef<str>>(&self, fields: &[S]) -> bool {
        self.has_named_policy(POLICY, fields)
    }

    pub fn has_named_policy<S: AsRef<str>>(&self, ptype: &str, fields: &[S]) -> bool {
        let fields = owned(fields);
        self.with_store(|store| store.has_rule(ptype, &fields))
    }

    pub fn has_grouping_policy<S: AsRef<str>>(&self, fields: &[S]) -> bool {
        self.has_named_policy(GROUPING, fields)
    }

    /// Distinct subjects named by `p` rules
    pub fn get_all_subjects(&self) -> Vec<String> {
        let index = self.policy_field_index("sub", 0);
        self.with_store(|store| store.get_values_for_field(POLICY, index))
    }

    /// Distinct objects named by `p` rules
    pub fn get_all_objects(&self) -> Vec<String> {
        let index = self.policy_field_index("obj", 1);
        self.with_store(|store| store.get_values_for_field(POLICY, index))
    }

    /// Distinct actions named by `p` rules
    pub fn get_all_actions(&self) -> Vec<String> {
        let index = self.policy_field_index("act", 2);
        self.with_store(|store| store.get_values_for_field(POLICY, index))
    }

    /// Distinct roles (parents) named by `g` rules
    pub fn get_all_roles(&self) -> Vec<String> {
        self.with_store(|store| store.get_values_for_field(GROUPING, 1))
    }

    // Policy mutations

    pub async fn add_policy<S: AsRef<str>>(&self, fields: &[S]) -> Result<bool> {
        self.add_named_policy(POLICY, fields).await
    }

    /// Add several `p` rules; returns `true` if at least one was new
    pub async fn add_policies<S: AsRef<str>>(&self, rules: &[Vec<S>]) -> Result<bool> {
        self.add_named_policies(POLICY, rules).await
    }

    pub async fn add_named_policy<S: AsRef<str>>(&self, ptype: &str, fields: &[S]) -> Result<bool> {
        self.require_policy_type(ptype)?;
        let guard = self.lock_mutations().await;
        let added = self.add_rules_internal(&guard, ptype, vec![owned(fields)]).await?;
        Ok(!added.is_empty())
    }

    pub async fn add_named_policies<S: AsRef<str>>(&self, ptype: &str, rules: &[Vec<S>]) -> Result<bool> {
        self.require_policy_type(ptype)?;
        let rules = rules.iter().map(|fields| owned(fields)).collect();
        let guard = self.lock_mutations().await;
        let added = self.add_rules_internal(&guard, ptype, rules).await?;
        Ok(!added.is_empty())
    }

    pub async fn remove_policy<S: AsRef<str>>(&self, fields: &[S]) -> Result<bool> {
        self.remove_named_policy(POLICY, fields).await
    }

    pub async fn remove_named_policy<S: AsRef<str>>(&self, ptype: &str, fields: &[S]) -> Result<bool> {
        self.require_policy_type(ptype)?;
        let guard = self.lock_mutations().await;
        self.remove_rule_internal(&guard, ptype, owned(fields)).await
    }

    /// Remove `p` rules matching a filter; `false` if nothing matched
    pub async fn remove_filtered_policy<S: AsRef<str>>(&self, field_index: usize, field_values: &[S]) -> Result<bool> {
        self.remove_filtered_named_policy(POLICY, field_index, field_values)
            .await
    }

    pub async fn remove_filtered_named_policy<S: AsRef<str>>(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[S],
    ) -> Result<bool> {
        self.require_policy_type(ptype)?;
        let guard = self.lock_mutations().await;
        let removed = self
            .remove_filtered_internal(&guard, ptype, field_index, owned(field_values))
            .await?;
        Ok(!removed.is_empty())
    }

    // Grouping mutations

    pub async fn add_grouping_policy<S: AsRef<str>>(&self, fields: &[S]) -> Result<bool> {
        self.add_named_grouping_policy(GROUPING, fields).await
    }

    pub async fn add_named_grouping_policy<S: AsRef<str>>(&self, ptype: &str, fields: &[S]) -> Result<bool> {
        self.require_grouping_type(ptype)?;
        let guard = self.lock_mutations().await;
        let added = self.add_rules_internal(&guard, ptype, vec![owned(fields)]).await?;
        Ok(!added.is_empty())
    }

    pub async fn remove_grouping_policy<S: AsRef<str>>(&self, fields: &[S]) -> Result<bool> {
        self.remove_named_grouping_policy(GROUPING, fields).await
    }

    pub async fn remove_named_grouping_policy<S: AsRef<str>>(&self, ptype: &str, fields: &[S]) -> Result<bool> {
        self.require_grouping_type(ptype)?;
        let guard = self.lock_mutations().await;
        self.remove_rule_internal(&guard, ptype, owned(fields)).await
    }

    pub async fn remove_filtered_grouping_policy<S: AsRef<str>>(
        &self,
        field_index: usize,
        field_values: &[S],
    ) -> Result<bool> {
        self.remove_filtered_named_grouping_policy(GROUPING, field_index, field_values)
            .await
    }

    pub async fn remove_filtered_named_grouping_policy<S: AsRef<str>>(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[S],
    ) -> Result<bool> {
        self.require_grouping_type(ptype)?;
        let guard = self.lock_mutations().await;
        let removed = self
            .remove_filtered_internal(&guard, ptype, field_index, owned(field_values))
            .await?;
        Ok(!removed.is_empty())
    }
}
