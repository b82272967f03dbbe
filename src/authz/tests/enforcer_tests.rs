//! Enforcement across model kinds: ACL, RBAC, deny rules, priority,
//! attribute rules and pattern matching

mod common;

use common::{assert_decisions, fixture, fixture_text, init_tracing, text_enforcer};
use keystone_authz::{
    AuthzError, EnforceContext, Enforcer, EnforcerConfig, MemoryAdapter, Model, Rule,
};
use serde_json::json;

// ============================================================================
// MODEL KINDS
// ============================================================================

#[tokio::test]
async fn test_rbac_model() {
    let e = text_enforcer("rbac").await;

    assert_decisions(
        &e,
        &[
            (&["alice", "data1", "read"], true),
            (&["alice", "data1", "write"], false),
            (&["alice", "data2", "read"], true),
            (&["alice", "data2", "write"], true),
            (&["bob", "data1", "read"], false),
            (&["bob", "data1", "write"], false),
            (&["bob", "data2", "read"], false),
            (&["bob", "data2", "write"], true),
        ],
    );
}

#[tokio::test]
async fn test_allow_and_deny_model() {
    let e = text_enforcer("rbac_with_deny").await;

    assert_decisions(
        &e,
        &[
            (&["alice", "data1", "read"], true),
            (&["alice", "data2", "read"], true),
            // inherited allow, explicit deny
            (&["alice", "data2", "write"], false),
            (&["bob", "data2", "write"], true),
        ],
    );

    let decision = e.enforce_ex(&["alice", "data2", "write"]).unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.rule_index, Some(4));
}

#[tokio::test]
async fn test_priority_model() {
    let e = text_enforcer("priority").await;

    assert_decisions(
        &e,
        &[
            (&["alice", "data1", "read"], true),
            (&["alice", "data1", "write"], false),
            (&["alice", "data2", "read"], false),
            (&["bob", "data2", "read"], true),
            (&["bob", "data2", "write"], false),
        ],
    );

    let decision = e.enforce_ex(&["alice", "data1", "write"]).unwrap();
    assert_eq!(
        decision.rule,
        Some(vec![
            "data1_deny_group".to_string(),
            "data1".to_string(),
            "write".to_string(),
            "deny".to_string()
        ])
    );
}

#[tokio::test]
async fn test_deny_override_model() {
    let e = text_enforcer("deny_override").await;

    assert_decisions(
        &e,
        &[
            (&["alice", "data1", "write"], false),
            (&["bob", "data2", "write"], false),
            (&["bob", "data1", "read"], true),
            (&["bob", "data2", "read"], true),
        ],
    );

    let decision = e.enforce_ex(&["bob", "data2", "write"]).unwrap();
    assert_eq!(decision.rule_index, Some(1));
}

#[tokio::test]
async fn test_deny_override_allows_unmatched_request() {
    let e = text_enforcer("deny_override").await;

    // No rule matches, so nothing denies it
    let decision = e.enforce_ex(&["alice", "data1", "read"]).unwrap();
    assert!(decision.allowed);
    assert!(decision.rule.is_none());
}

#[tokio::test]
async fn test_all_allow_model() {
    let e = text_enforcer("all_allow").await;

    assert_decisions(
        &e,
        &[
            (&["alice", "data1", "read"], true),
            (&["admin", "data1", "write"], true),
            (&["alice", "data1", "write"], false),
            (&["admin", "vault", "read"], false),
        ],
    );

    let decision = e.enforce_ex(&["admin", "vault", "read"]).unwrap();
    assert_eq!(decision.rule_index, Some(1));

    let empty = Enforcer::from_text(&fixture_text("all_allow_model.conf"), "").await.unwrap();
    assert!(!empty.enforce(&["alice", "data1", "read"]).unwrap());
}

#[tokio::test]
async fn test_abac_model_with_eval() {
    let e = text_enforcer("abac").await;

    let adult = json!({"name": "alice", "age": 30, "dept": "eng"});
    let minor = json!({"name": "tim", "age": 16, "dept": "eng"});
    let senior = json!({"name": "carol", "age": 70, "dept": "ops"});

    let data1 = json!({"name": "data1", "owner": "bob"});
    let data2 = json!({"name": "data2", "owner": "bob"});
    let data3 = json!({"name": "data3", "owner": "alice"});

    assert!(e.enforce_values(vec![adult.clone(), data1.clone(), json!("read")]).unwrap());
    assert!(!e.enforce_values(vec![minor.clone(), data1.clone(), json!("read")]).unwrap());
    assert!(e.enforce_values(vec![adult.clone(), data2.clone(), json!("write")]).unwrap());
    assert!(!e.enforce_values(vec![senior.clone(), data2, json!("write")]).unwrap());
    assert!(e.enforce_values(vec![adult, data3.clone(), json!("read")]).unwrap());
    assert!(!e.enforce_values(vec![minor, data3, json!("read")]).unwrap());

    // Missing attributes fail the rule, not the call
    assert!(!e.enforce_values(vec![json!({"name": "x"}), data1, json!("read")]).unwrap());
}

#[tokio::test]
async fn test_key_and_regex_matching() {
    let e = text_enforcer("keymatch").await;

    assert_decisions(
        &e,
        &[
            (&["alice", "/alice_data/resource1", "GET"], true),
            (&["alice", "/alice_data/resource1", "POST"], true),
            (&["alice", "/alice_data/resource2", "POST"], false),
            (&["alice", "/bob_data/resource1", "GET"], false),
            (&["bob", "/bob_data/123", "POST"], true),
            (&["bob", "/bob_data/1/2", "GET"], false),
            (&["cathy", "/cathy_data", "GET"], true),
            (&["cathy", "/cathy_data", "DELETE"], false),
        ],
    );
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

#[tokio::test]
async fn test_from_files() {
    init_tracing();
    let e = Enforcer::from_files(fixture("rbac_model.conf"), fixture("rbac_policy.csv"))
        .await
        .unwrap();

    assert!(e.enforce(&["alice", "data2", "read"]).unwrap());
    assert_eq!(e.get_policy().len(), 4);
}

#[tokio::test]
async fn test_malformed_model_is_rejected() {
    let result = Enforcer::from_text("[request_definition]\nr = sub\n", "").await;
    assert!(matches!(result, Err(AuthzError::ModelConfig(_))));

    let bad_matcher = fixture_text("rbac_model.conf").replace("r.act == p.act", "r.act == 'unterminated");
    let result = Enforcer::from_text(&bad_matcher, "").await;
    assert!(matches!(result, Err(AuthzError::MatcherCompile(_))));
}

#[tokio::test]
async fn test_config_round_trips_through_json() {
    let config: EnforcerConfig =
        serde_json::from_str(r#"{"cache_capacity": 16, "max_hierarchy_level": 1}"#).unwrap();

    assert!(config.enable_cache);
    assert_eq!(config.cache_capacity, 16);
    assert_eq!(config.max_hierarchy_level, Some(1));
    assert!(config.auto_save);
}

#[tokio::test]
async fn test_max_hierarchy_level_limits_inheritance() {
    let model = Model::from_text(&fixture_text("rbac_model.conf")).unwrap();
    let adapter = MemoryAdapter::with_rules(vec![
        Rule::new("p", ["admin", "data1", "read"]),
        Rule::new("g", ["alice", "staff"]),
        Rule::new("g", ["staff", "admin"]),
        Rule::new("g", ["bob", "admin"]),
    ]);
    let config = EnforcerConfig {
        max_hierarchy_level: Some(1),
        ..Default::default()
    };
    let e = Enforcer::with_config(model, adapter, config).await.unwrap();

    assert!(e.enforce(&["bob", "data1", "read"]).unwrap());
    assert!(!e.enforce(&["alice", "data1", "read"]).unwrap());
}

// ============================================================================
// ENFORCEMENT VARIANTS
// ============================================================================

#[tokio::test]
async fn test_enforce_with_matcher() {
    let e = text_enforcer("rbac").await;

    // Ignore the action entirely
    let matcher = "g(r.sub, p.sub) && r.obj == p.obj";
    assert!(e.enforce_with_matcher(matcher, &["alice", "data1", "delete"]).unwrap());
    assert!(!e.enforce(&["alice", "data1", "delete"]).unwrap());
}

#[tokio::test]
async fn test_enforce_with_context() {
    let model = r#"
[request_definition]
r = sub, obj, act
r2 = sub, act

[policy_definition]
p = sub, obj, act
p2 = sub, act

[policy_effect]
e = some(where (p.eft == allow))
e2 = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
m2 = r2.sub == p2.sub && r2.act == p2.act
"#;
    let e = Enforcer::from_text(model, "p, alice, data1, read\np2, bob, write\n")
        .await
        .unwrap();

    let ctx = EnforceContext::with_suffix("2");
    assert!(e.enforce_with_context(&ctx, vec![json!("bob"), json!("write")]).unwrap().allowed);
    assert!(!e.enforce_with_context(&ctx, vec![json!("alice"), json!("read")]).unwrap().allowed);
    assert!(e.enforce(&["alice", "data1", "read"]).unwrap());

    let missing = EnforceContext::with_suffix("3");
    assert!(matches!(
        e.enforce_with_context(&missing, vec![json!("bob")]),
        Err(AuthzError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_enforce_is_deterministic() {
    let e = text_enforcer("rbac").await;

    let first: Vec<bool> = ["read", "write"]
        .iter()
        .map(|act| e.enforce(&["alice", "data2", act]).unwrap())
        .collect();
    for _ in 0..10 {
        let again: Vec<bool> = ["read", "write"]
            .iter()
            .map(|act| e.enforce(&["alice", "data2", act]).unwrap())
            .collect();
        assert_eq!(first, again);
    }
}

#[tokio::test]
async fn test_mutation_invalidates_cached_decision() {
    let e = text_enforcer("rbac").await;

    assert!(e.enforce(&["alice", "data2", "read"]).unwrap());
    assert!(e.enforce_ex(&["alice", "data2", "read"]).unwrap().cached);

    e.delete_role_for_user("alice", "data2_admin").await.unwrap();
    let decision = e.enforce_ex(&["alice", "data2", "read"]).unwrap();
    assert!(!decision.allowed);
    assert!(!decision.cached);
}
