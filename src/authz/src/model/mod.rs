//! Access-control model: request and policy schemas, role definitions,
//! effect policies and matchers

pub mod parser;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::effect::EffectPolicy;
use crate::error::{AuthzError, Result};
use parser::{parse_assignments, parse_tokens, Section};

/// Name of the policy field holding a rule's declared effect
pub const EFFECT_TOKEN: &str = "eft";

/// A grouping rule type and the role graph it feeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDefinition {
    /// Rule type, also the role graph name (`g`, `g2`, ...)
    pub ptype: String,

    /// Number of fields in each grouping rule (2, or 3 with a domain)
    pub arity: usize,
}

impl RoleDefinition {
    /// Whether grouping rules carry a domain as their third field
    pub fn has_domain(&self) -> bool {
        self.arity >= 3
    }
}

/// Parsed model configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    requests: BTreeMap<String, Vec<String>>,
    policies: BTreeMap<String, Vec<String>>,
    roles: BTreeMap<String, RoleDefinition>,
    effects: BTreeMap<String, EffectPolicy>,
    matchers: BTreeMap<String, String>,
}

impl Model {
    /// Parse a model from configuration text
    ///
    /// # Errors
    /// Returns `ModelConfig` when the text is malformed, a required section
    /// is missing, or a definition is invalid
    pub fn from_text(text: &str) -> Result<Self> {
        let mut model = Model {
            requests: BTreeMap::new(),
            policies: BTreeMap::new(),
            roles: BTreeMap::new(),
            effects: BTreeMap::new(),
            matchers: BTreeMap::new(),
        };

        for assignment in parse_assignments(text)? {
            let key = assignment.key;
            let duplicate = match assignment.section {
                Section::Request => model
                    .requests
                    .insert(key.clone(), field_tokens(&key, &assignment.value)?)
                    .is_some(),
                Section::Policy => model
                    .policies
                    .insert(key.clone(), field_tokens(&key, &assignment.value)?)
                    .is_some(),
                Section::Role => {
                    let definition = role_definition(&key, &assignment.value)?;
                    model.roles.insert(key.clone(), definition).is_some()
                }
                Section::Effect => model
                    .effects
                    .insert(key.clone(), EffectPolicy::from_expression(&assignment.value)?)
                    .is_some(),
                Section::Matchers => model
                    .matchers
                    .insert(key.clone(), assignment.value)
                    .is_some(),
            };

            if duplicate {
                return Err(AuthzError::ModelConfig(format!(
                    "line {}: '{}' is defined twice",
                    assignment.line, key
                )));
            }
        }

        model.validate()?;
        debug!(
            "Model parsed: {} request, {} policy, {} role definitions",
            model.requests.len(),
            model.policies.len(),
            model.roles.len()
        );

        Ok(model)
    }

    /// Read and parse a model file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_text(&text)
    }

    fn validate(&self) -> Result<()> {
        for (map_empty, section) in [
            (self.requests.is_empty(), Section::Request),
            (self.policies.is_empty(), Section::Policy),
            (self.effects.is_empty(), Section::Effect),
            (self.matchers.is_empty(), Section::Matchers),
        ] {
            if map_empty {
                return Err(AuthzError::ModelConfig(format!(
                    "missing [{}] section",
                    section.header()
                )));
            }
        }

        for key in ["r", "p", "e", "m"] {
            let present = match key {
                "r" => self.requests.contains_key(key),
                "p" => self.policies.contains_key(key),
                "e" => self.effects.contains_key(key),
                _ => self.matchers.contains_key(key),
            };
            if !present {
                return Err(AuthzError::ModelConfig(format!("missing definition '{}'", key)));
            }
        }

        Ok(())
    }

    /// Field names of request type `key`
    pub fn request_tokens(&self, key: &str) -> Option<&[String]> {
        self.requests.get(key).map(Vec::as_slice)
    }

    /// Field names of policy type `key`
    pub fn policy_tokens(&self, key: &str) -> Option<&[String]> {
        self.policies.get(key).map(Vec::as_slice)
    }

    /// Position of the `eft` field in policy type `key`
    pub fn effect_index(&self, key: &str) -> Option<usize> {
        self.policy_tokens(key)?
            .iter()
            .position(|token| token == EFFECT_TOKEN)
    }

    /// Effect policy `key`
    pub fn effect(&self, key: &str) -> Option<EffectPolicy> {
        self.effects.get(key).copied()
    }

    /// Matcher source text `key`
    pub fn matcher(&self, key: &str) -> Option<&str> {
        self.matchers.get(key).map(String::as_str)
    }

    /// All matchers, by key
    pub fn matchers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.matchers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Policy rule types ("p", "p2", ...) in key order
    pub fn policy_types(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Role definitions in key order
    pub fn role_definitions(&self) -> impl Iterator<Item = &RoleDefinition> {
        self.roles.values()
    }

    /// Role definition for grouping type `ptype`
    pub fn role_definition(&self, ptype: &str) -> Option<&RoleDefinition> {
        self.roles.get(ptype)
    }

    /// Whether `ptype` is a grouping rule type
    pub fn is_grouping(&self, ptype: &str) -> bool {
        self.roles.contains_key(ptype)
    }

    /// Number of fields a rule of `ptype` must have, if `ptype` is defined
    pub fn rule_arity(&self, ptype: &str) -> Option<usize> {
        self.policies
            .get(ptype)
            .map(Vec::len)
            .or_else(|| self.roles.get(ptype).map(|role| role.arity))
    }

    /// Check a rule against its type's arity
    pub fn check_rule(&self, ptype: &str, fields: &[String]) -> Result<()> {
        match self.rule_arity(ptype) {
            None => Err(AuthzError::InvalidPolicy(format!("unknown rule type '{}'", ptype))),
            Some(arity) if arity != fields.len() => Err(AuthzError::InvalidPolicy(format!(
                "rule type '{}' expects {} fields, got {}",
                ptype,
                arity,
                fields.len()
            ))),
            Some(_) => Ok(()),
        }
    }
}

impl FromStr for Model {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_text(s)
    }
}

fn field_tokens(key: &str, value: &str) -> Result<Vec<String>> {
    let tokens = parse_tokens(value);
    let mut seen = HashSet::new();

    for token in &tokens {
        let valid = token
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(AuthzError::ModelConfig(format!(
                "invalid field name '{}' in '{}'",
                token, key
            )));
        }
        if !seen.insert(token.as_str()) {
            return Err(AuthzError::ModelConfig(format!(
                "field '{}' appears twice in '{}'",
                token, key
            )));
        }
    }

    Ok(tokens)
}

fn role_definition(key: &str, value: &str) -> Result<RoleDefinition> {
    let tokens = parse_tokens(value);
    if tokens.len() < 2 || tokens.len() > 3 || tokens.iter().any(|t| t != "_") {
        return Err(AuthzError::ModelConfig(format!(
            "role definition '{}' must be '_, _' or '_, _, _', got '{}'",
            key, value
        )));
    }

    Ok(RoleDefinition {
        ptype: key.to_string(),
        arity: tokens.len(),
    })
}
