use rulegate::lifecycle::{
    AllowListCohort, NoGrayCohort, RoutingContext, RuleError, RuleRegistry, RuleVersionId,
};
use serde_json::json;
use tempfile::TempDir;

fn id(raw: &str) -> RuleVersionId {
    raw.parse().expect("valid version id")
}

#[test]
fn publish_activate_gray_and_rollback_scenario() {
    let tmp = TempDir::new().unwrap();
    let registry = RuleRegistry::open(tmp.path()).unwrap();

    let v1 = registry
        .versions()
        .publish("init", json!({"topics": ["hypertension"]}))
        .unwrap();
    assert_eq!(v1.id.to_string(), "v1");
    registry.activation().activate(id("v1")).unwrap();
    assert_eq!(
        registry.activation().current_active().unwrap().unwrap().id,
        id("v1")
    );

    let v2 = registry
        .versions()
        .publish("add liver", json!({"topics": ["hypertension", "liver"]}))
        .unwrap();
    assert_eq!(v2.id.to_string(), "v2");
    assert_eq!(registry.activation().active_id(), Some(id("v1")));

    registry.gray().set_gray(id("v2"), true).unwrap();
    assert!(registry.gray().is_gray(id("v2")));
    assert!(!registry.gray().is_gray(id("v1")));
    let canary = RoutingContext::new("canary");
    let cohort = AllowListCohort::new(["canary"]);
    assert_eq!(
        registry.resolve_version_for_request(&canary, &cohort),
        Some(id("v2"))
    );
    assert_eq!(
        registry.resolve_version_for_request(&canary, &NoGrayCohort),
        Some(id("v1"))
    );

    registry.activation().activate(id("v2")).unwrap();
    assert_eq!(
        registry.activation().current_active().unwrap().unwrap().id,
        id("v2")
    );
    assert!(registry.gray().is_gray(id("v2")));
}

#[test]
fn empty_changelog_creates_nothing() {
    let tmp = TempDir::new().unwrap();
    let registry = RuleRegistry::open(tmp.path()).unwrap();
    registry.versions().publish("init", json!({"a": 1})).unwrap();
    let before = registry.versions().list(100, None).unwrap().items.len();
    let err = registry
        .versions()
        .publish("", json!({"a": 2}))
        .unwrap_err();
    assert!(matches!(err, RuleError::Validation(_)));
    assert_eq!(registry.versions().list(100, None).unwrap().items.len(), before);
    let next = registry.versions().publish("second", json!({"a": 2})).unwrap();
    assert_eq!(next.id.to_string(), "v2");
}

#[test]
fn unknown_ids_leave_pointer_and_gray_set_untouched() {
    let tmp = TempDir::new().unwrap();
    let registry = RuleRegistry::open(tmp.path()).unwrap();
    let v1 = registry.versions().publish("init", json!({"a": 1})).unwrap();
    registry.activation().activate(v1.id).unwrap();
    registry.gray().set_gray(v1.id, true).unwrap();
    let pointer = registry.activation().pointer();

    let missing = id("v42");
    assert!(matches!(
        registry.activation().activate(missing),
        Err(RuleError::NotFound { .. })
    ));
    assert!(matches!(
        registry.gray().set_gray(missing, true),
        Err(RuleError::NotFound { .. })
    ));
    assert_eq!(registry.activation().pointer(), pointer);
    assert_eq!(registry.gray().members(), vec![v1.id]);
}

#[test]
fn identifiers_strictly_increase() {
    let tmp = TempDir::new().unwrap();
    let registry = RuleRegistry::open(tmp.path()).unwrap();
    let ids: Vec<RuleVersionId> = (0..20)
        .map(|n| {
            registry
                .versions()
                .publish(&format!("change {n}"), json!({"n": n}))
                .unwrap()
                .id
        })
        .collect();
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
}
