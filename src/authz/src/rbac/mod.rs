//! Role graphs
//!
//! One [`RoleGraph`] exists per grouping rule type declared in the model's
//! `[role_definition]` section. The enforcer keeps them in sync with the
//! grouping rules in the policy store and exposes them to matchers through
//! `g(...)`-style function calls.
//!
//! # Features
//!
//! - **Cycle Safety**: BFS with a visited set, cycles are legal input
//! - **Domains**: every edge is keyed by an optional domain
//! - **Depth Limit**: optional maximum hierarchy level per graph

pub mod graph;

pub use graph::RoleGraph;

use std::collections::HashMap;

/// Role graphs keyed by grouping rule type ("g", "g2", ...)
pub type RoleGraphs = HashMap<String, RoleGraph>;
