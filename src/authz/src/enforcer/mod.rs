//! Enforcer: policy store, role graphs and matcher evaluation behind one lock
//!
//! # Architecture
//!
//! ```text
//! enforce(request) → PolicyStore rules × Engine(matcher, role graphs) → EffectPolicy → Decision
//!        ↓                                                                  ↑
//!   [DecisionCache] ────────────────────────────────────────────────────────┘
//!
//! add_policy / remove_policy → Adapter (auto-save) → PolicyStore (+ RoleGraph for g rules)
//! ```
//!
//! `enforce` and every query take the state read lock. Mutations are
//! serialized by a separate async mutex held from the store check through the
//! adapter call; the state write lock is taken only after the adapter has
//! accepted the change.

pub mod cache;
pub mod decision;
pub mod management_api;
pub mod rbac_api;

pub use cache::{CacheKey, CachedVerdict, DecisionCache};
pub use decision::{Decision, EnforceContext};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, FileAdapter, StringAdapter};
use crate::effect::Effect;
use crate::error::{AdapterError, AuthzError, Result};
use crate::expr::{Engine, EvalContext, Function, FunctionMap};
use crate::model::Model;
use crate::policy::PolicyStore;
use crate::rbac::{RoleGraph, RoleGraphs};

/// Enforcer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcerConfig {
    /// Cache decisions until the next policy change
    pub enable_cache: bool,

    /// Maximum number of cached decisions
    pub cache_capacity: usize,

    /// Limit on role inheritance depth (None = unbounded)
    pub max_hierarchy_level: Option<usize>,

    /// Forward single-rule mutations to the adapter
    pub auto_save: bool,

    /// Keep role graphs in sync with grouping rules
    pub auto_build_role_links: bool,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_capacity: 10_000,
            max_hierarchy_level: None,
            auto_save: true,
            auto_build_role_links: true,
        }
    }
}

/// State guarded by the enforcer lock
struct EnforcerState {
    store: PolicyStore,
    role_graphs: RoleGraphs,
    functions: FunctionMap,
}

/// Held for the whole of one mutation, cascades included
pub(crate) type MutationGuard<'a> = MutexGuard<'a, ()>;

/// Authorization enforcer
///
/// Owns its policy store and role graphs exclusively. Share it across tasks
/// with `Arc<Enforcer>`.
pub struct Enforcer {
    model: Arc<Model>,
    adapter: Arc<dyn Adapter>,
    state: RwLock<EnforcerState>,
    mutation: Mutex<()>,
    engine: Engine,
    cache: Option<DecisionCache>,
    config: EnforcerConfig,
}

impl Enforcer {
    /// Create an enforcer with the default configuration and load its policy
    ///
    /// # Errors
    /// Fails if a matcher does not compile, or if the adapter cannot load
    pub async fn new(model: Model, adapter: impl Adapter + 'static) -> Result<Self> {
        Self::with_config(model, adapter, EnforcerConfig::default()).await
    }

    /// Create an enforcer with an explicit configuration and load its policy
    pub async fn with_config(
        model: Model,
        adapter: impl Adapter + 'static,
        config: EnforcerConfig,
    ) -> Result<Self> {
        let engine = Engine::new();
        let functions = FunctionMap::default();

        for (key, source) in model.matchers() {
            let program = engine.compile_pinned(source)?;
            for name in program.expr().called_functions() {
                let known = functions.contains(name)
                    || model.is_grouping(name)
                    || matches!(name, "eval" | "hasLink");
                if !known {
                    warn!(
                        "Matcher '{}' calls '{}', which is not registered yet",
                        key, name
                    );
                }
            }
        }

        let cache = config
            .enable_cache
            .then(|| DecisionCache::new(config.cache_capacity));
        let role_graphs = empty_role_graphs(&model, config.max_hierarchy_level);

        let enforcer = Self {
            model: Arc::new(model),
            adapter: Arc::new(adapter),
            state: RwLock::new(EnforcerState {
                store: PolicyStore::new(),
                role_graphs,
                functions,
            }),
            mutation: Mutex::new(()),
            engine,
            cache,
            config,
        };

        enforcer.load_policy().await?;
        info!(
            "Enforcer initialized with cache={}, auto_save={}, max_hierarchy_level={:?}",
            enforcer.config.enable_cache, enforcer.config.auto_save, enforcer.config.max_hierarchy_level
        );

        Ok(enforcer)
    }

    /// Build from model text and newline-separated policy text (read-only)
    pub async fn from_text(model_text: &str, policy_text: &str) -> Result<Self> {
        let model = Model::from_text(model_text)?;
        Self::new(model, StringAdapter::new(policy_text)).await
    }

    /// Build from a model file and a policy file
    pub async fn from_files(model_path: impl AsRef<Path>, policy_path: impl AsRef<Path>) -> Result<Self> {
        let model = Model::from_file(model_path).await?;
        Self::new(model, FileAdapter::new(policy_path.as_ref())).await
    }

    /// The model this enforcer evaluates
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Active configuration
    pub fn config(&self) -> &EnforcerConfig {
        &self.config
    }

    /// Matcher program cache
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Number of cached decisions
    pub fn cached_decisions(&self) -> usize {
        self.cache.as_ref().map_or(0, DecisionCache::len)
    }

    // ------------------------------------------------------------------
    // Enforcement
    // ------------------------------------------------------------------

    /// Decide whether a request of plain strings is allowed
    ///
    /// # Errors
    /// `InvalidInput` if the request arity does not match the model. Matcher
    /// failures on individual rules never surface here.
    pub fn enforce(&self, request: &[&str]) -> Result<bool> {
        Ok(self.enforce_ex(request)?.allowed)
    }

    /// Decide a request whose fields may be attribute objects (`r.sub.age`)
    pub fn enforce_values(&self, request: Vec<Value>) -> Result<bool> {
        Ok(self.decide(&EnforceContext::default(), None, &request)?.allowed)
    }

    /// Like [`Enforcer::enforce`], also reporting the deciding rule
    pub fn enforce_ex(&self, request: &[&str]) -> Result<Decision> {
        self.decide(&EnforceContext::default(), None, &string_values(request))
    }

    /// Enforce using numbered definitions such as `r2`/`p2`/`e2`/`m2`
    pub fn enforce_with_context(&self, ctx: &EnforceContext, request: Vec<Value>) -> Result<Decision> {
        self.decide(ctx, None, &request)
    }

    /// Enforce with an ad-hoc matcher in place of the model's `m`
    pub fn enforce_with_matcher(&self, matcher: &str, request: &[&str]) -> Result<bool> {
        Ok(self
            .decide(&EnforceContext::default(), Some(matcher), &string_values(request))?
            .allowed)
    }

    fn decide(&self, ctx: &EnforceContext, matcher: Option<&str>, request: &[Value]) -> Result<Decision> {
        let model = &self.model;
        let r_tokens = model
            .request_tokens(&ctx.r)
            .ok_or_else(|| AuthzError::InvalidInput(format!("unknown request definition '{}'", ctx.r)))?;
        let p_tokens = model
            .policy_tokens(&ctx.p)
            .ok_or_else(|| AuthzError::InvalidInput(format!("unknown policy definition '{}'", ctx.p)))?;
        let effect = model
            .effect(&ctx.e)
            .ok_or_else(|| AuthzError::InvalidInput(format!("unknown policy effect '{}'", ctx.e)))?;
        let source = match matcher {
            Some(source) => source,
            None => model
                .matcher(&ctx.m)
                .ok_or_else(|| AuthzError::InvalidInput(format!("unknown matcher '{}'", ctx.m)))?,
        };

        if request.len() != r_tokens.len() {
            return Err(AuthzError::InvalidInput(format!(
                "request has {} fields, '{}' defines {}",
                request.len(),
                ctx.r,
                r_tokens.len()
            )));
        }

        let program = self.engine.compile(source)?;
        let key = self
            .cache
            .as_ref()
            .map(|_| DecisionCache::key(ctx, source, request));

        // Held past the cache insert so a concurrent clear cannot be undone
        let state = self.state.read();

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key) {
                debug!("Cache hit: {:?} -> {}", request, hit.allowed);
                let mut decision = Decision::new(hit.allowed, hit.rule, hit.rule_index);
                decision.cached = true;
                return Ok(decision);
            }
        }

        let base = EvalContext::new(&state.functions)
            .with_request(&ctx.r, r_tokens, request)
            .with_role_graphs(&state.role_graphs);
        let effect_index = model.effect_index(&ctx.p);

        let rule_effect = |fields: &[String]| -> Effect {
            let rule_ctx = base.clone().with_policy(&ctx.p, p_tokens, fields);
            match self.engine.evaluate(&program, &rule_ctx) {
                Ok(true) => Effect::from_declared(
                    effect_index.and_then(|i| fields.get(i)).map(String::as_str),
                ),
                Ok(false) => Effect::Indeterminate,
                Err(err) => {
                    warn!("Matcher failed for rule {:?}: {}", fields, err);
                    Effect::Indeterminate
                }
            }
        };

        let rules = state.store.get_rules(&ctx.p);
        let verdict = if rules.is_empty() {
            let empty = vec![String::new(); p_tokens.len()];
            let mut verdict = effect.combine(std::iter::once(rule_effect(empty.as_slice())));
            verdict.deciding_index = None;
            verdict
        } else {
            effect.combine(rules.iter().map(|fields| rule_effect(fields.as_slice())))
        };

        let rule = verdict.deciding_index.and_then(|i| rules.get(i).cloned());
        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.put(
                key,
                CachedVerdict {
                    allowed: verdict.allowed,
                    rule: rule.clone(),
                    rule_index: verdict.deciding_index,
                },
            );
        }

        debug!(
            "Decision: {:?} -> {} (rule {:?})",
            request, verdict.allowed, rule
        );

        Ok(Decision::new(verdict.allowed, rule, verdict.deciding_index))
    }

    // ------------------------------------------------------------------
    // Policy lifecycle
    // ------------------------------------------------------------------

    /// Reload every rule from the adapter, replacing the in-memory state
    ///
    /// Rules of types the model does not define are skipped with a warning.
    ///
    /// # Errors
    /// Adapter failures, or `InvalidPolicy` when a rule has the wrong arity.
    /// On error the previous state is kept.
    pub async fn load_policy(&self) -> Result<()> {
        let _guard = self.lock_mutations().await;
        let rules = self.adapter.load_policy().await?;

        let mut store = PolicyStore::new();
        for rule in rules {
            if self.model.rule_arity(&rule.ptype).is_none() {
                warn!("Skipping rule of unknown type: {}", rule);
                continue;
            }
            self.model.check_rule(&rule.ptype, &rule.fields)?;
            store.add_rule(&rule.ptype, rule.fields);
        }

        let role_graphs = if self.config.auto_build_role_links {
            build_role_graphs(&self.model, &store, self.config.max_hierarchy_level)
        } else {
            empty_role_graphs(&self.model, self.config.max_hierarchy_level)
        };

        let count = store.len();
        {
            let mut state = self.state.write();
            state.store = store;
            state.role_graphs = role_graphs;
            self.clear_cache();
        }

        info!("Loaded {} policy rules", count);
        Ok(())
    }

    /// Write the whole in-memory rule set through the adapter
    pub async fn save_policy(&self) -> Result<()> {
        let _guard = self.lock_mutations().await;
        let rules = self.state.read().store.to_rules();
        self.adapter.save_policy(&rules).await?;
        info!("Saved {} policy rules", rules.len());
        Ok(())
    }

    /// Drop every rule and role link from memory (the adapter is untouched)
    pub fn clear_policy(&self) {
        let mut state = self.state.write();
        state.store.clear();
        state.role_graphs.values_mut().for_each(RoleGraph::clear);
        self.clear_cache();
        info!("Cleared in-memory policy");
    }

    /// Rebuild every role graph from the current grouping rules
    pub fn build_role_links(&self) {
        let mut state = self.state.write();
        state.role_graphs = build_role_graphs(&self.model, &state.store, self.config.max_hierarchy_level);
        self.clear_cache();
        debug!("Rebuilt role links");
    }

    /// Register or replace a matcher function
    pub fn add_function(&self, name: impl Into<String>, function: Function) {
        let name = name.into();
        let mut state = self.state.write();
        state.functions.add(name.clone(), function);
        self.clear_cache();
        debug!("Registered function '{}'", name);
    }

    fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    // ------------------------------------------------------------------
    // Mutation primitives shared by the management and RBAC APIs
    // ------------------------------------------------------------------

    /// Serialize mutations; pass the guard to the `*_internal` primitives
    pub(crate) async fn lock_mutations(&self) -> MutationGuard<'_> {
        self.mutation.lock().await
    }

    /// Treat `NotSupported` as "memory only"; any other adapter error aborts
    fn tolerate(&self, operation: &str, result: std::result::Result<(), AdapterError>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_supported() => {
                debug!("Adapter cannot persist {}; applied in memory only", operation);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Add rules of one type; returns the rules that were actually new
    pub(crate) async fn add_rules_internal(
        &self,
        _guard: &MutationGuard<'_>,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<Vec<Vec<String>>> {
        for fields in &rules {
            self.model.check_rule(ptype, fields)?;
        }

        let fresh: Vec<Vec<String>> = {
            let state = self.state.read();
            let mut fresh: Vec<Vec<String>> = Vec::new();
            for fields in rules {
                if !state.store.has_rule(ptype, &fields) && !fresh.contains(&fields) {
                    fresh.push(fields);
                }
            }
            fresh
        };
        if fresh.is_empty() {
            return Ok(fresh);
        }

        if self.config.auto_save {
            let result = if let [single] = fresh.as_slice() {
                self.adapter.add_policy(ptype, single).await
            } else {
                self.adapter.add_policies(ptype, &fresh).await
            };
            self.tolerate("add_policy", result)?;
        }

        let mut state = self.state.write();
        let added = state.store.add_rules(ptype, fresh);
        if self.model.is_grouping(ptype) && self.config.auto_build_role_links {
            if let Some(graph) = state.role_graphs.get_mut(ptype) {
                for fields in &added {
                    link_rule(graph, fields, true);
                }
            }
        }
        self.clear_cache();

        debug!("Added {} rules of type '{}'", added.len(), ptype);
        Ok(added)
    }

    /// Remove one rule; returns whether it was present
    pub(crate) async fn remove_rule_internal(
        &self,
        _guard: &MutationGuard<'_>,
        ptype: &str,
        fields: Vec<String>,
    ) -> Result<bool> {
        if !self.state.read().store.has_rule(ptype, &fields) {
            return Ok(false);
        }

        if self.config.auto_save {
            let result = self.adapter.remove_policy(ptype, &fields).await;
            self.tolerate("remove_policy", result)?;
        }

        let mut state = self.state.write();
        let removed = state.store.remove_rule(ptype, &fields);
        if removed && self.model.is_grouping(ptype) && self.config.auto_build_role_links {
            if let Some(graph) = state.role_graphs.get_mut(ptype) {
                link_rule(graph, &fields, false);
            }
        }
        self.clear_cache();

        debug!("Removed rule {} {:?}: {}", ptype, fields, removed);
        Ok(removed)
    }

    /// Remove every rule matching a positional filter; returns the removed rules
    pub(crate) async fn remove_filtered_internal(
        &self,
        _guard: &MutationGuard<'_>,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<Vec<Vec<String>>> {
        if self
            .state
            .read()
            .store
            .get_filtered_rules(ptype, field_index, &field_values)
            .is_empty()
        {
            return Ok(Vec::new());
        }

        if self.config.auto_save {
            let result = self
                .adapter
                .remove_filtered_policy(ptype, field_index, &field_values)
                .await;
            self.tolerate("remove_filtered_policy", result)?;
        }

        let mut state = self.state.write();
        let removed = state
            .store
            .remove_filtered_rules(ptype, field_index, &field_values);
        if self.model.is_grouping(ptype) && self.config.auto_build_role_links {
            if let Some(graph) = state.role_graphs.get_mut(ptype) {
                for fields in &removed {
                    link_rule(graph, fields, false);
                }
            }
        }
        self.clear_cache();

        debug!(
            "Removed {} rules of type '{}' matching {:?} at {}",
            removed.len(),
            ptype,
            field_values,
            field_index
        );
        Ok(removed)
    }

    /// Remove every rule of `ptype` holding `value` in any field
    ///
    /// Mirrored to the adapter as one positional filter per field index.
    pub(crate) async fn remove_containing_internal(
        &self,
        guard: &MutationGuard<'_>,
        ptype: &str,
        value: &str,
    ) -> Result<Vec<Vec<String>>> {
        let Some(arity) = self.model.rule_arity(ptype) else {
            return Ok(Vec::new());
        };
        if value.is_empty() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        for field_index in 0..arity {
            removed.extend(
                self.remove_filtered_internal(guard, ptype, field_index, vec![value.to_string()])
                    .await?,
            );
        }
        Ok(removed)
    }

    /// Remove `name` and every edge touching it from role graph `ptype`
    pub(crate) fn delete_role_node(&self, _guard: &MutationGuard<'_>, ptype: &str, name: &str) -> bool {
        let mut state = self.state.write();
        let deleted = state
            .role_graphs
            .get_mut(ptype)
            .is_some_and(|graph| graph.delete_node(name));
        if deleted {
            self.clear_cache();
        }
        deleted
    }

    /// Run `f` with shared access to the policy store
    pub(crate) fn with_store<T>(&self, f: impl FnOnce(&PolicyStore) -> T) -> T {
        f(&self.state.read().store)
    }

    /// Run `f` with shared access to role graph `ptype`, if the model defines it
    pub(crate) fn with_role_graph<T>(&self, ptype: &str, f: impl FnOnce(&RoleGraph) -> T) -> Option<T> {
        self.state.read().role_graphs.get(ptype).map(f)
    }
}

fn string_values(request: &[&str]) -> Vec<Value> {
    request.iter().map(|s| Value::String(s.to_string())).collect()
}

fn empty_role_graphs(model: &Model, max_hierarchy_level: Option<usize>) -> RoleGraphs {
    model
        .role_definitions()
        .map(|definition| {
            (
                definition.ptype.clone(),
                RoleGraph::new(definition.ptype.as_str()).with_max_hierarchy_level(max_hierarchy_level),
            )
        })
        .collect()
}

fn build_role_graphs(model: &Model, store: &PolicyStore, max_hierarchy_level: Option<usize>) -> RoleGraphs {
    let mut graphs = empty_role_graphs(model, max_hierarchy_level);
    for (ptype, graph) in graphs.iter_mut() {
        for fields in store.get_rules(ptype) {
            link_rule(graph, fields, true);
        }
    }
    graphs
}

/// Mirror one grouping rule `[child, parent(, domain)]` into `graph`
fn link_rule(graph: &mut RoleGraph, fields: &[String], add: bool) {
    let (child, parent, domain) = match fields {
        [child, parent] => (child, parent, None),
        [child, parent, domain, ..] => (child, parent, Some(domain.as_str())),
        _ => return,
    };

    if add {
        graph.add_link(child, parent, domain);
    } else {
        graph.delete_link(child, parent, domain);
    }
}
