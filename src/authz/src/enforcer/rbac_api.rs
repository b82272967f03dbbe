//! Role-based access control API
//!
//! Direct queries (`get_roles_for_user`, `get_users_for_role`,
//! `has_role_for_user`, `get_permissions_for_user`) look exactly one hop into
//! the role graph or policy store. Only the `transitive`/`implicit` variants
//! and `enforce` itself follow inheritance chains.

use std::collections::HashSet;

use super::management_api::owned;
use super::Enforcer;
use crate::error::Result;

const ROLE_GRAPH: &str = "g";

impl Enforcer {
    fn direct_parents(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.with_role_graph(ROLE_GRAPH, |graph| graph.get_direct_parents(name, domain))
            .unwrap_or_default()
    }

    fn direct_children(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.with_role_graph(ROLE_GRAPH, |graph| graph.get_direct_children(name, domain))
            .unwrap_or_default()
    }

    /// Roles assigned directly to `user`
    pub fn get_roles_for_user(&self, user: &str) -> Vec<String> {
        self.direct_parents(user, None)
    }

    /// Every role `user` holds, directly or through other roles
    ///
    /// Never contains `user` itself, even when a cycle leads back to it.
    pub fn get_all_transitive_roles_for_user(&self, user: &str) -> Vec<String> {
        self.with_role_graph(ROLE_GRAPH, |graph| graph.get_all_parents_transitive(user, None))
            .unwrap_or_default()
    }

    /// Alias of [`Enforcer::get_all_transitive_roles_for_user`]
    pub fn get_implicit_roles_for_user(&self, user: &str) -> Vec<String> {
        self.get_all_transitive_roles_for_user(user)
    }

    /// Users (or roles) holding `role` directly
    pub fn get_users_for_role(&self, role: &str) -> Vec<String> {
        self.direct_children(role, None)
    }

    /// Whether `role` is assigned directly to `user`
    pub fn has_role_for_user(&self, user: &str, role: &str) -> bool {
        self.get_roles_for_user(user).iter().any(|r| r == role)
    }

    /// Returns `false` if the user already had the role
    pub async fn add_role_for_user(&self, user: &str, role: &str) -> Result<bool> {
        self.add_grouping_policy(&[user, role]).await
    }

    /// Returns `false` if the user did not have the role
    pub async fn delete_role_for_user(&self, user: &str, role: &str) -> Result<bool> {
        self.remove_grouping_policy(&[user, role]).await
    }

    /// Remove every role assigned directly to `user`
    pub async fn delete_roles_for_user(&self, user: &str) -> Result<bool> {
        self.remove_filtered_grouping_policy(0, &[user]).await
    }

    /// Remove `user` everywhere: its node in every role graph, the grouping
    /// rules linking it in either direction, and every policy rule naming it
    /// in any field
    pub async fn delete_user(&self, user: &str) -> Result<bool> {
        self.delete_node_cascade(user).await
    }

    /// Remove `role` everywhere, exactly as [`Enforcer::delete_user`] does
    ///
    /// Deleting an unknown role is a no-op returning `false`.
    pub async fn delete_role(&self, role: &str) -> Result<bool> {
        self.delete_node_cascade(role).await
    }

    async fn delete_node_cascade(&self, name: &str) -> Result<bool> {
        if name.is_empty() {
            return Ok(false);
        }

        let model = self.model();
        let grouping_types: Vec<String> = model
            .role_definitions()
            .map(|definition| definition.ptype.clone())
            .collect();
        let policy_types: Vec<String> = model.policy_types().map(str::to_string).collect();

        let guard = self.lock_mutations().await;
        let mut changed = false;
        for ptype in &grouping_types {
            for field_index in 0..2 {
                changed |= !self
                    .remove_filtered_internal(&guard, ptype, field_index, vec![name.to_string()])
                    .await?
                    .is_empty();
            }
        }
        for ptype in &policy_types {
            changed |= !self
                .remove_containing_internal(&guard, ptype, name)
                .await?
                .is_empty();
        }

        // With auto_build_role_links off the removals above leave graph edges behind
        for ptype in &grouping_types {
            changed |= self.delete_role_node(&guard, ptype, name);
        }

        Ok(changed)
    }

    /// Grant `user` a permission, e.g. `&["data1", "read"]`
    pub async fn add_permission_for_user<S: AsRef<str>>(&self, user: &str, permission: &[S]) -> Result<bool> {
        self.add_policy(&subject_rule(user, permission)).await
    }

    pub async fn delete_permission_for_user<S: AsRef<str>>(&self, user: &str, permission: &[S]) -> Result<bool> {
        self.remove_policy(&subject_rule(user, permission)).await
    }

    /// Remove every permission granted directly to `user`
    pub async fn delete_permissions_for_user(&self, user: &str) -> Result<bool> {
        self.remove_filtered_policy(0, &[user]).await
    }

    /// Remove a permission from every subject
    pub async fn delete_permission<S: AsRef<str>>(&self, permission: &[S]) -> Result<bool> {
        self.remove_filtered_policy(1, permission).await
    }

    /// Permissions granted directly to `user`, excluding inherited ones
    pub fn get_permissions_for_user(&self, user: &str) -> Vec<Vec<String>> {
        self.get_filtered_policy(0, &[user])
    }

    pub fn has_permission_for_user<S: AsRef<str>>(&self, user: &str, permission: &[S]) -> bool {
        self.has_policy(&subject_rule(user, permission))
    }

    /// Permissions of `user` and of every role it holds transitively
    pub fn get_implicit_permissions_for_user(&self, user: &str) -> Vec<Vec<String>> {
        let mut subjects = vec![user.to_string()];
        subjects.extend(self.get_all_transitive_roles_for_user(user));

        let mut seen = HashSet::new();
        subjects
            .iter()
            .flat_map(|subject| self.get_permissions_for_user(subject))
            .filter(|rule| seen.insert(rule.clone()))
            .collect()
    }

    // Domain variants

    pub fn get_roles_for_user_in_domain(&self, user: &str, domain: &str) -> Vec<String> {
        self.direct_parents(user, Some(domain))
    }

    pub fn get_users_for_role_in_domain(&self, role: &str, domain: &str) -> Vec<String> {
        self.direct_children(role, Some(domain))
    }

    pub async fn add_role_for_user_in_domain(&self, user: &str, role: &str, domain: &str) -> Result<bool> {
        self.add_grouping_policy(&[user, role, domain]).await
    }

    pub async fn delete_role_for_user_in_domain(&self, user: &str, role: &str, domain: &str) -> Result<bool> {
        self.remove_grouping_policy(&[user, role, domain]).await
    }
}

fn subject_rule<S: AsRef<str>>(user: &str, permission: &[S]) -> Vec<String> {
    let mut rule = vec![user.to_string()];
    rule.extend(owned(permission));
    rule
}
