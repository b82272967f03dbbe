//! Shared helpers for integration tests

#![allow(dead_code)]

use keystone_authz::Enforcer;
use std::path::PathBuf;
use std::sync::Once;

static INIT: Once = Once::new();

/// Install a tracing subscriber once; filter with `RUST_LOG`
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Path of a file under `tests/fixtures`
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Read a fixture into a string
pub fn fixture_text(name: &str) -> String {
    std::fs::read_to_string(fixture(name)).unwrap_or_else(|e| panic!("fixture {}: {}", name, e))
}

/// Enforcer over `<name>_model.conf` and `<name>_policy.csv` with a read-only adapter
pub async fn text_enforcer(name: &str) -> Enforcer {
    init_tracing();
    let model = fixture_text(&format!("{}_model.conf", name));
    let policy = fixture_text(&format!("{}_policy.csv", name));
    Enforcer::from_text(&model, &policy)
        .await
        .unwrap_or_else(|e| panic!("enforcer {}: {}", name, e))
}

/// Compare as sets, ignoring order
pub fn assert_same_set(actual: Vec<String>, expected: &[&str]) {
    let mut actual = actual;
    actual.sort();
    let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    expected.sort();
    assert_eq!(actual, expected);
}

/// Assert a batch of `(request, expected)` decisions
pub fn assert_decisions(e: &Enforcer, cases: &[(&[&str], bool)]) {
    for (request, expected) in cases {
        assert_eq!(
            e.enforce(request).unwrap(),
            *expected,
            "enforce({:?}) should be {}",
            request,
            expected
        );
    }
}
