//! Per-rule effects and the policies that combine them into one decision

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthzError, Result};

/// Outcome of evaluating one policy rule against a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
    /// Matcher was false, failed, or the rule declared an unknown effect
    Indeterminate,
}

impl Effect {
    /// Effect of a rule whose matcher returned true
    ///
    /// `declared` is the rule's `eft` field when the model defines one.
    pub fn from_declared(declared: Option<&str>) -> Self {
        match declared.map(str::trim) {
            None | Some("") => Effect::Allow,
            Some(eft) if eft.eq_ignore_ascii_case("allow") => Effect::Allow,
            Some(eft) if eft.eq_ignore_ascii_case("deny") => Effect::Deny,
            Some(_) => Effect::Indeterminate,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => write!(f, "allow"),
            Effect::Deny => write!(f, "deny"),
            Effect::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// How per-rule effects reduce to a single decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectPolicy {
    /// `some(where (p.eft == allow))`
    SomeAllow,

    /// `!some(where (p.eft == deny))`
    ///
    /// The one policy that does not fail closed: a request no rule matches
    /// is allowed, since nothing denied it.
    DenyOverride,

    /// `some(where (p.eft == allow)) && !some(where (p.eft == deny))`
    AllowAndDeny,

    /// `priority(p.eft) || deny`: first decisive rule in store order wins
    Priority,

    /// `all(where (p.eft == allow))`
    AllAllow,
}

/// Result of combining effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,

    /// Index of the rule that decided the outcome, if a single rule did
    pub deciding_index: Option<usize>,
}

impl Verdict {
    fn allow(index: Option<usize>) -> Self {
        Self {
            allowed: true,
            deciding_index: index,
        }
    }

    fn deny(index: Option<usize>) -> Self {
        Self {
            allowed: false,
            deciding_index: index,
        }
    }
}

impl EffectPolicy {
    /// Parse the `[policy_effect]` expression of a model
    ///
    /// Whitespace is not significant.
    pub fn from_expression(expression: &str) -> Result<Self> {
        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();

        let policy = match compact.as_str() {
            "some(where(p.eft==allow))" => EffectPolicy::SomeAllow,
            "!some(where(p.eft==deny))" => EffectPolicy::DenyOverride,
            "some(where(p.eft==allow))&&!some(where(p.eft==deny))" => EffectPolicy::AllowAndDeny,
            "priority(p.eft)||deny" => EffectPolicy::Priority,
            "all(where(p.eft==allow))" => EffectPolicy::AllAllow,
            _ => {
                return Err(AuthzError::ModelConfig(format!(
                    "unsupported policy effect: {}",
                    expression
                )))
            }
        };

        Ok(policy)
    }

    /// Reduce effects, given in policy store order, to a decision
    ///
    /// The iterator is consumed lazily and abandoned as soon as the outcome is
    /// fixed, so callers may evaluate matchers inside it.
    pub fn combine<I>(self, effects: I) -> Verdict
    where
        I: IntoIterator<Item = Effect>,
    {
        let mut effects = effects.into_iter().enumerate();

        match self {
            EffectPolicy::SomeAllow => effects
                .find(|(_, effect)| *effect == Effect::Allow)
                .map_or(Verdict::deny(None), |(i, _)| Verdict::allow(Some(i))),

            EffectPolicy::DenyOverride => effects
                .find(|(_, effect)| *effect == Effect::Deny)
                .map_or(Verdict::allow(None), |(i, _)| Verdict::deny(Some(i))),

            EffectPolicy::AllowAndDeny => {
                let mut first_allow = None;
                for (i, effect) in effects {
                    match effect {
                        Effect::Deny => return Verdict::deny(Some(i)),
                        Effect::Allow if first_allow.is_none() => first_allow = Some(i),
                        _ => {}
                    }
                }
                match first_allow {
                    Some(i) => Verdict::allow(Some(i)),
                    None => Verdict::deny(None),
                }
            }

            EffectPolicy::Priority => effects
                .find(|(_, effect)| *effect != Effect::Indeterminate)
                .map_or(Verdict::deny(None), |(i, effect)| Verdict {
                    allowed: effect == Effect::Allow,
                    deciding_index: Some(i),
                }),

            EffectPolicy::AllAllow => {
                let mut evaluated = false;
                for (i, effect) in effects {
                    if effect != Effect::Allow {
                        return Verdict::deny(Some(i));
                    }
                    evaluated = true;
                }
                if evaluated {
                    Verdict::allow(None)
                } else {
                    Verdict::deny(None)
                }
            }
        }
    }
}
