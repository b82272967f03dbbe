//! # Keystone Authorization Engine
//!
//! Embeddable access-control engine driven by a model file and policy rules.
//!
//! ## Features
//!
//! - **Configurable models**: ACL, RBAC (with domains) and attribute-based rules
//! - **Role graphs** with cycle-safe transitive resolution
//! - **Matcher expressions** compiled once and interpreted per rule
//! - **Effect policies**: some-allow, deny-override, priority, all-allow
//! - **Pluggable adapters** for loading and persisting policy
//! - **LRU caching** of decisions, cleared on every policy change
//!
//! ## Example
//!
//! ```rust
//! use keystone_authz::Enforcer;
//!
//! const MODEL: &str = r#"
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
//! "#;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let enforcer = Enforcer::from_text(MODEL, "p, admin, data1, read\ng, alice, admin").await?;
//!
//!     if enforcer.enforce(&["alice", "data1", "read"])? {
//!         println!("Access granted!");
//!     }
//!
//!     assert_eq!(enforcer.get_roles_for_user("alice"), vec!["admin"]);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod effect;
pub mod enforcer;
pub mod error;
pub mod expr;
pub mod model;
pub mod policy;
pub mod rbac;

// Re-export commonly used types
pub use adapter::{Adapter, FileAdapter, MemoryAdapter, StringAdapter};
pub use effect::{Effect, EffectPolicy};
pub use enforcer::{Decision, EnforceContext, Enforcer, EnforcerConfig};
pub use error::{AdapterError, AuthzError, Result};
pub use expr::{Function, FunctionMap};
pub use model::Model;
pub use policy::{PolicyStore, Rule};
pub use rbac::RoleGraph;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
