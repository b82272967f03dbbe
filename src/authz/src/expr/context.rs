//! Binding environment for matcher evaluation

use serde_json::Value;
use std::borrow::Cow;

use super::functions::FunctionMap;
use crate::rbac::RoleGraphs;

/// Values bound to one scope (`r` or `p`)
#[derive(Debug, Clone, Copy)]
enum ScopeValues<'a> {
    /// Request values, possibly attribute objects
    Values(&'a [Value]),

    /// Policy rule fields
    Strings(&'a [String]),
}

#[derive(Debug, Clone, Copy)]
struct Scope<'a> {
    name: &'a str,
    tokens: &'a [String],
    values: ScopeValues<'a>,
}

/// Everything a matcher may reference while being evaluated
///
/// Built per policy rule: the request scope stays the same across rules while
/// the policy scope is swapped with [`EvalContext::with_policy`].
#[derive(Clone)]
pub struct EvalContext<'a> {
    scopes: Vec<Scope<'a>>,
    functions: &'a FunctionMap,
    role_graphs: Option<&'a RoleGraphs>,
}

impl<'a> EvalContext<'a> {
    /// Create a context with no scopes bound
    pub fn new(functions: &'a FunctionMap) -> Self {
        Self {
            scopes: Vec::new(),
            functions,
            role_graphs: None,
        }
    }

    /// Bind request values under `name`, field names taken from `tokens`
    pub fn with_request(mut self, name: &'a str, tokens: &'a [String], values: &'a [Value]) -> Self {
        self.bind(Scope {
            name,
            tokens,
            values: ScopeValues::Values(values),
        });
        self
    }

    /// Bind one policy rule under `name`
    pub fn with_policy(mut self, name: &'a str, tokens: &'a [String], fields: &'a [String]) -> Self {
        self.bind(Scope {
            name,
            tokens,
            values: ScopeValues::Strings(fields),
        });
        self
    }

    /// Make role graphs callable by their grouping type name
    pub fn with_role_graphs(mut self, role_graphs: &'a RoleGraphs) -> Self {
        self.role_graphs = Some(role_graphs);
        self
    }

    fn bind(&mut self, scope: Scope<'a>) {
        self.scopes.retain(|existing| existing.name != scope.name);
        self.scopes.push(scope);
    }

    /// Look up `scope.field`; `None` if the scope or field is not bound
    pub fn lookup(&self, scope: &str, field: &str) -> Option<Cow<'a, Value>> {
        let bound = self.scopes.iter().find(|s| s.name == scope)?;
        let index = bound.tokens.iter().position(|token| token == field)?;

        match bound.values {
            ScopeValues::Values(values) => values.get(index).map(Cow::Borrowed),
            ScopeValues::Strings(fields) => fields
                .get(index)
                .map(|value| Cow::Owned(Value::String(value.clone()))),
        }
    }

    /// Registered functions
    pub fn functions(&self) -> &'a FunctionMap {
        self.functions
    }

    /// Role graphs, if bound
    pub fn role_graphs(&self) -> Option<&'a RoleGraphs> {
        self.role_graphs
    }
}
