//! Concurrent enforcement while the policy changes underneath

mod common;

use async_trait::async_trait;
use common::{fixture_text, text_enforcer};
use keystone_authz::adapter::Adapter;
use keystone_authz::{AdapterError, Enforcer, Model, Rule};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enforce() {
    let e = Arc::new(text_enforcer("rbac").await);

    let mut handles = Vec::new();
    for i in 0..16 {
        let e = Arc::clone(&e);
        handles.push(tokio::spawn(async move {
            for _ in 0..200 {
                let act = if i % 2 == 0 { "read" } else { "write" };
                assert!(e.enforce(&["alice", "data2", act]).unwrap());
                assert!(!e.enforce(&["bob", "data1", act]).unwrap());
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_enforce_during_mutations() {
    let e = Arc::new(text_enforcer("rbac").await);

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let e = Arc::clone(&e);
            tokio::spawn(async move {
                for _ in 0..500 {
                    // alice's direct permission never changes
                    assert!(e.enforce(&["alice", "data1", "read"]).unwrap());
                    let _ = e.get_roles_for_user("carol");
                }
            })
        })
        .collect();

    let writer = {
        let e = Arc::clone(&e);
        tokio::spawn(async move {
            for i in 0..100 {
                let role = format!("role{}", i % 5);
                e.add_role_for_user("carol", &role).await.unwrap();
                e.delete_role_for_user("carol", &role).await.unwrap();
            }
        })
    };

    for reader in readers {
        reader.await.unwrap();
    }
    writer.await.unwrap();

    assert!(e.get_roles_for_user("carol").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cached_decision_never_outlives_mutation() {
    let e = Arc::new(text_enforcer("rbac").await);

    for _ in 0..50 {
        e.add_role_for_user("dave", "data2_admin").await.unwrap();
        assert!(e.enforce(&["dave", "data2", "read"]).unwrap());

        e.delete_role_for_user("dave", "data2_admin").await.unwrap();
        assert!(!e.enforce(&["dave", "data2", "read"]).unwrap());
    }
}

/// Adapter that takes a while to persist and counts every write it receives
#[derive(Default)]
struct SlowAdapter {
    writes: Arc<AtomicUsize>,
}

#[async_trait]
impl Adapter for SlowAdapter {
    async fn load_policy(&self) -> Result<Vec<Rule>, AdapterError> {
        Ok(Vec::new())
    }

    async fn save_policy(&self, _rules: &[Rule]) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn add_policy(&self, _ptype: &str, _fields: &[String]) -> Result<(), AdapterError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_policy(&self, _ptype: &str, _fields: &[String]) -> Result<(), AdapterError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_filtered_policy(
        &self,
        _ptype: &str,
        _field_index: usize,
        _field_values: &[String],
    ) -> Result<(), AdapterError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_identical_concurrent_adds_reach_adapter_once() {
    let adapter = SlowAdapter::default();
    let writes = Arc::clone(&adapter.writes);
    let model = Model::from_text(&fixture_text("rbac_model.conf")).unwrap();
    let e = Arc::new(Enforcer::new(model, adapter).await.unwrap());

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let e = Arc::clone(&e);
            tokio::spawn(async move { e.add_policy(&["eve", "data3", "read"]).await.unwrap() })
        })
        .collect();

    let mut added = 0;
    for task in tasks {
        if task.await.unwrap() {
            added += 1;
        }
    }

    assert_eq!(added, 1);
    assert_eq!(e.get_policy().len(), 1);
    assert_eq!(writes.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cascade_runs_as_one_mutation() {
    let adapter = SlowAdapter::default();
    let model = Model::from_text(&fixture_text("rbac_model.conf")).unwrap();
    let e = Arc::new(Enforcer::new(model, adapter).await.unwrap());

    e.add_policy(&["admin", "data1", "read"]).await.unwrap();
    e.add_role_for_user("alice", "admin").await.unwrap();

    // The re-add queues behind the cascade instead of slipping between its steps
    let cascade = {
        let e = Arc::clone(&e);
        tokio::spawn(async move { e.delete_role("admin").await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let readd = {
        let e = Arc::clone(&e);
        tokio::spawn(async move { e.add_role_for_user("bob", "admin").await.unwrap() })
    };

    assert!(cascade.await.unwrap());
    assert!(readd.await.unwrap());
    assert_eq!(e.get_grouping_policy(), vec![vec!["bob", "admin"]]);
    assert_eq!(e.get_roles_for_user("bob"), vec!["admin"]);
    assert!(e.get_policy().is_empty());
}

#[test]
fn test_enforcer_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Enforcer>();
}

#[test]
fn test_blocking_construction() {
    let e = tokio_test::block_on(text_enforcer("rbac"));
    assert!(e.enforce(&["alice", "data2", "write"]).unwrap());
}
