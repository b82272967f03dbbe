//! Adapter capabilities as seen through the enforcer

mod common;

use common::{fixture, fixture_text, init_tracing};
use keystone_authz::adapter::Adapter;
use keystone_authz::{
    AdapterError, AuthzError, Enforcer, EnforcerConfig, FileAdapter, MemoryAdapter, Model, Rule,
};
use async_trait::async_trait;

fn rbac_model() -> Model {
    Model::from_text(&fixture_text("rbac_model.conf")).unwrap()
}

#[tokio::test]
async fn test_read_only_adapter_mutates_in_memory() {
    let e = common::text_enforcer("rbac").await;

    assert!(e.add_policy(&["eve", "data3", "read"]).await.unwrap());
    assert!(e.enforce(&["eve", "data3", "read"]).unwrap());

    // Reloading from the fixed string drops the in-memory change
    e.load_policy().await.unwrap();
    assert!(!e.enforce(&["eve", "data3", "read"]).unwrap());
}

#[tokio::test]
async fn test_file_adapter_persists_on_save() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.csv");
    std::fs::copy(fixture("rbac_policy.csv"), &path).unwrap();

    let e = Enforcer::new(rbac_model(), FileAdapter::new(&path)).await.unwrap();
    e.add_role_for_user("bob", "data2_admin").await.unwrap();

    // Single mutations are not mirrored to the file
    let reloaded = FileAdapter::new(&path).load_policy().await.unwrap();
    assert_eq!(reloaded.len(), 5);

    e.save_policy().await.unwrap();
    let reloaded = FileAdapter::new(&path).load_policy().await.unwrap();
    assert_eq!(reloaded.len(), 6);
    assert!(reloaded.contains(&Rule::new("g", ["bob", "data2_admin"])));

    let fresh = Enforcer::new(rbac_model(), FileAdapter::new(&path)).await.unwrap();
    assert!(fresh.enforce(&["bob", "data2", "read"]).unwrap());
}

#[tokio::test]
async fn test_memory_adapter_mirrors_every_mutation() {
    let adapter = MemoryAdapter::new();
    let e = Enforcer::new(rbac_model(), adapter.clone()).await.unwrap();

    e.add_permission_for_user("alice", &["data1", "read"]).await.unwrap();
    e.add_role_for_user("bob", "alice").await.unwrap();
    assert_eq!(adapter.rules().await.len(), 2);

    e.delete_user("bob").await.unwrap();
    assert_eq!(adapter.rules().await, vec![Rule::new("p", ["alice", "data1", "read"])]);
}

#[tokio::test]
async fn test_auto_save_disabled_skips_adapter() {
    let adapter = MemoryAdapter::new();
    let config = EnforcerConfig {
        auto_save: false,
        ..Default::default()
    };
    let e = Enforcer::with_config(rbac_model(), adapter.clone(), config).await.unwrap();

    e.add_policy(&["alice", "data1", "read"]).await.unwrap();
    assert!(adapter.rules().await.is_empty());

    e.save_policy().await.unwrap();
    assert_eq!(adapter.rules().await.len(), 1);
}

/// Adapter whose mutations always fail with a backend error
struct BrokenAdapter;

#[async_trait]
impl Adapter for BrokenAdapter {
    async fn load_policy(&self) -> Result<Vec<Rule>, AdapterError> {
        Ok(vec![Rule::new("p", ["alice", "data1", "read"])])
    }

    async fn save_policy(&self, _rules: &[Rule]) -> Result<(), AdapterError> {
        Err(AdapterError::Backend("disk full".into()))
    }

    async fn add_policy(&self, _ptype: &str, _fields: &[String]) -> Result<(), AdapterError> {
        Err(AdapterError::Backend("disk full".into()))
    }

    async fn remove_policy(&self, _ptype: &str, _fields: &[String]) -> Result<(), AdapterError> {
        Err(AdapterError::Backend("disk full".into()))
    }

    async fn remove_filtered_policy(
        &self,
        _ptype: &str,
        _field_index: usize,
        _field_values: &[String],
    ) -> Result<(), AdapterError> {
        Err(AdapterError::Backend("disk full".into()))
    }
}

#[tokio::test]
async fn test_adapter_failure_aborts_mutation() {
    let e = Enforcer::new(rbac_model(), BrokenAdapter).await.unwrap();

    let err = e.add_policy(&["bob", "data2", "write"]).await.unwrap_err();
    assert!(matches!(err, AuthzError::Adapter(AdapterError::Backend(_))));
    assert!(!e.has_policy(&["bob", "data2", "write"]));

    let err = e.remove_policy(&["alice", "data1", "read"]).await.unwrap_err();
    assert!(matches!(err, AuthzError::Adapter(_)));
    assert!(e.enforce(&["alice", "data1", "read"]).unwrap());
}

#[tokio::test]
async fn test_missing_policy_file_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let result = Enforcer::from_files(fixture("rbac_model.conf"), dir.path().join("absent.csv")).await;
    assert!(matches!(result, Err(AuthzError::Adapter(AdapterError::Io(_)))));
}
