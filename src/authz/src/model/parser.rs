//! Model configuration text parser
//!
//! The format is INI-like:
//!
//! ```text
//! [request_definition]
//! r = sub, obj, act
//!
//! [policy_definition]
//! p = sub, obj, act
//!
//! [role_definition]
//! g = _, _
//!
//! [policy_effect]
//! e = some(where (p.eft == allow))
//!
//! [matchers]
//! m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
//! ```
//!
//! Lines starting with `#` or `;` are comments. A trailing `\` joins the next
//! line onto the current one.

use crate::error::{AuthzError, Result};

/// Top-level sections of a model file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Request,
    Policy,
    Role,
    Effect,
    Matchers,
}

impl Section {
    fn from_header(name: &str) -> Option<Self> {
        match name {
            "request_definition" => Some(Section::Request),
            "policy_definition" => Some(Section::Policy),
            "role_definition" => Some(Section::Role),
            "policy_effect" => Some(Section::Effect),
            "matchers" => Some(Section::Matchers),
            _ => None,
        }
    }

    /// Letter every key in this section must start with
    pub fn key_prefix(self) -> char {
        match self {
            Section::Request => 'r',
            Section::Policy => 'p',
            Section::Role => 'g',
            Section::Effect => 'e',
            Section::Matchers => 'm',
        }
    }

    /// Header text as written in the file
    pub fn header(self) -> &'static str {
        match self {
            Section::Request => "request_definition",
            Section::Policy => "policy_definition",
            Section::Role => "role_definition",
            Section::Effect => "policy_effect",
            Section::Matchers => "matchers",
        }
    }
}

/// One `key = value` assignment with its section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub section: Section,
    pub key: String,
    pub value: String,
    pub line: usize,
}

fn config_error(line: usize, reason: impl std::fmt::Display) -> AuthzError {
    AuthzError::ModelConfig(format!("line {}: {}", line, reason))
}

/// Split model text into assignments, in file order
pub fn parse_assignments(text: &str) -> Result<Vec<Assignment>> {
    let mut assignments = Vec::new();
    let mut section = None;
    let mut pending: Option<(String, usize)> = None;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();

        if pending.is_none() && (line.is_empty() || line.starts_with('#') || line.starts_with(';')) {
            continue;
        }

        // Join continuation lines before interpreting anything
        let (joined, start) = match pending.take() {
            Some((mut buffer, start)) => {
                buffer.push(' ');
                buffer.push_str(line);
                (buffer, start)
            }
            None => (line.to_string(), line_no),
        };
        if let Some(stripped) = joined.strip_suffix('\\') {
            pending = Some((stripped.trim_end().to_string(), start));
            continue;
        }

        if let Some(header) = joined.strip_prefix('[') {
            let name = header
                .strip_suffix(']')
                .ok_or_else(|| config_error(start, "unterminated section header"))?;
            section = Some(
                Section::from_header(name.trim())
                    .ok_or_else(|| config_error(start, format!("unknown section [{}]", name.trim())))?,
            );
            continue;
        }

        let current = section.ok_or_else(|| config_error(start, "assignment outside of any section"))?;
        let (key, value) = joined
            .split_once('=')
            .ok_or_else(|| config_error(start, format!("expected 'key = value', got '{}'", joined)))?;
        let key = key.trim();
        let value = value.trim();

        if !key.starts_with(current.key_prefix()) || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(config_error(
                start,
                format!("invalid key '{}' in [{}]", key, current.header()),
            ));
        }
        if value.is_empty() {
            return Err(config_error(start, format!("empty value for '{}'", key)));
        }

        assignments.push(Assignment {
            section: current,
            key: key.to_string(),
            value: value.to_string(),
            line: start,
        });
    }

    if let Some((_, start)) = pending {
        return Err(config_error(start, "line continuation at end of input"));
    }

    Ok(assignments)
}

/// Split a comma-separated token list, e.g. `sub, obj, act`
pub fn parse_tokens(value: &str) -> Vec<String> {
    value.split(',').map(|token| token.trim().to_string()).collect()
}
