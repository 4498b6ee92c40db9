//! End-to-end reconciliation tests
//!
//! Each test drives a module through the registry, exactly as the CLI does,
//! against a recording fake of the ARM client:
//! - Create, no-op, update and delete paths
//! - Check mode never mutates
//! - Delete confirmation and long-running operations
//! - Redaction of `no_log` values
//! - Idempotence of a second run

mod common;

use common::*;
use azrm::modules::FailureKind;
use azrm::redact::NO_LOG_MARKER;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn item_args(sku: &str) -> serde_json::Value {
    json!({
        "state": "present",
        "resource_group": "rg1",
        "name": "item1",
        "sku": sku,
    })
}

fn absent_args() -> serde_json::Value {
    json!({
        "state": "absent",
        "resource_group": "rg1",
        "name": "item1",
    })
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_create_new() {
    let client = Arc::new(
        FakeArmClient::new()
            .completing(Completion::Immediate(Some(json!({"id": ITEM_ID, "sku": "S1"})))),
    );
    let output = registry()
        .execute("test_item", &params(item_args("S1")), &context(client.clone()))
        .await;

    assert!(!output.failed, "{:?}", output.msg);
    assert!(output.changed);
    assert_eq!(output.data["item"], json!({"id": ITEM_ID}));

    let mutations = client.mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].operation, "create_or_update");
    assert_eq!(mutations[0].body, Some(json!({"sku": "S1"})));
    assert_eq!(mutations[0].coordinates.get("resource_group"), Some("rg1"));
    assert_eq!(mutations[0].coordinates.get("name"), Some("item1"));
    // The create result carries an id, so the initial read is the only one.
    assert_eq!(client.count("get"), 1);
}

#[tokio::test]
async fn test_update_equivalent_is_noop() {
    let client = Arc::new(FakeArmClient::with_resource(json!({
        "id": ITEM_ID,
        "sku": "S1",
        "extraServerField": "x",
    })));
    let output = registry()
        .execute("test_item", &params(item_args("S1")), &context(client.clone()))
        .await;

    assert!(!output.failed, "{:?}", output.msg);
    assert!(!output.changed);
    assert_eq!(output.data["item"], json!({"id": ITEM_ID}));
    assert!(client.mutations().is_empty());
}

#[tokio::test]
async fn test_update_diff() {
    let client = Arc::new(FakeArmClient::with_resource(json!({"id": ITEM_ID, "sku": "S1"})));
    let output = registry()
        .execute("test_item", &params(item_args("S2")), &context(client.clone()))
        .await;

    assert!(!output.failed, "{:?}", output.msg);
    assert!(output.changed);

    let mutations = client.mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].operation, "create_or_update");
    // Read-only members never travel back to the service.
    assert_eq!(mutations[0].body, Some(json!({"sku": "S2"})));
}

#[tokio::test]
async fn test_delete_present_waits_for_absence() {
    let present = json!({"id": ITEM_ID, "sku": "S1"});
    let client = Arc::new(FakeArmClient::new().script_gets(vec![
        Some(present.clone()),
        Some(present.clone()),
        Some(present),
        None,
    ]));
    let output = registry()
        .execute("test_item", &params(absent_args()), &context(client.clone()))
        .await;

    assert!(!output.failed, "{:?}", output.msg);
    assert!(output.changed);
    assert_eq!(output.data["item"], json!({}));
    assert_eq!(client.count("delete"), 1);
    // One initial read, then three confirmation reads until absent.
    assert_eq!(client.count("get"), 4);
}

#[tokio::test]
async fn test_delete_absent_is_noop() {
    let client = Arc::new(FakeArmClient::new());
    let output = registry()
        .execute("test_item", &params(absent_args()), &context(client.clone()))
        .await;

    assert!(!output.failed, "{:?}", output.msg);
    assert!(!output.changed);
    assert_eq!(output.data["item"], json!({}));
    assert_eq!(client.count("delete"), 0);
}

#[tokio::test]
async fn test_dry_run_create() {
    let client = Arc::new(FakeArmClient::new());
    let mut args = item_args("S1");
    args["_check_mode"] = json!(true);

    let output = registry()
        .execute("test_item", &params(args), &context(client.clone()))
        .await;

    assert!(!output.failed, "{:?}", output.msg);
    assert!(output.changed);
    assert_eq!(output.data["item"], json!({}));
    assert!(client.mutations().is_empty());
}

// ============================================================================
// Boundary behaviors
// ============================================================================

#[tokio::test]
async fn test_dry_run_absent_on_absent_is_unchanged() {
    let client = Arc::new(FakeArmClient::new());
    let context = context(client.clone()).with_check_mode(true);
    let output = registry()
        .execute("test_item", &params(absent_args()), &context)
        .await;

    assert!(!output.changed);
    assert!(client.mutations().is_empty());
}

#[tokio::test]
async fn test_dry_run_update_reports_current_state() {
    let client = Arc::new(FakeArmClient::with_resource(json!({"id": ITEM_ID, "sku": "S1"})));
    let context = context(client.clone()).with_check_mode(true).with_diff_mode(true);
    let output = registry()
        .execute("test_item", &params(item_args("S2")), &context)
        .await;

    assert!(output.changed);
    assert_eq!(output.data["item"], json!({"id": ITEM_ID}));
    let diff = output.diff.expect("diff requested");
    assert_eq!(diff.before["sku"], "S1");
    assert_eq!(diff.after["sku"], "S2");
    assert!(client.mutations().is_empty());
}

#[tokio::test]
async fn test_unknown_argument_is_input_failure() {
    let client = Arc::new(FakeArmClient::new());
    let mut args = item_args("S1");
    args["colour"] = json!("blue");

    let output = registry()
        .execute("test_item", &params(args), &context(client.clone()))
        .await;

    assert!(output.failed);
    assert_eq!(output.failure_kind, Some(FailureKind::Input));
    assert!(output.msg.unwrap_or_default().contains("colour"));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_missing_required_argument_is_input_failure() {
    let client = Arc::new(FakeArmClient::new());
    let output = registry()
        .execute(
            "test_item",
            &params(json!({"name": "item1"})),
            &context(client.clone()),
        )
        .await;

    assert_eq!(output.failure_kind, Some(FailureKind::Input));
    assert!(output.msg.unwrap_or_default().contains("resource_group"));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_lro_that_never_completes_is_transient() {
    let client = Arc::new(FakeArmClient::new().completing(Completion::Never));
    let output = registry()
        .execute("test_item", &params(item_args("S1")), &context(client.clone()))
        .await;

    assert!(output.failed);
    assert_eq!(output.failure_kind, Some(FailureKind::Transient));
    assert!(output.msg.unwrap_or_default().contains("create_or_update"));
    // The operation was accepted, so the resource may have changed.
    assert!(output.changed);
}

#[tokio::test]
async fn test_lro_result_is_published() {
    let client = Arc::new(FakeArmClient::new().completing(Completion::AfterPolls(
        2,
        json!({"id": ITEM_ID, "sku": "S1"}),
    )));
    let output = registry()
        .execute("test_item", &params(item_args("S1")), &context(client.clone()))
        .await;

    assert!(!output.failed, "{:?}", output.msg);
    assert_eq!(output.data["item"], json!({"id": ITEM_ID}));
}

#[tokio::test]
async fn test_incomplete_mutation_result_is_reread() {
    let client = Arc::new(
        FakeArmClient::new()
            .script_gets(vec![None, Some(json!({"id": ITEM_ID, "sku": "S1"}))])
            .completing(Completion::Immediate(Some(json!({"sku": "S1"})))),
    );
    let output = registry()
        .execute("test_item", &params(item_args("S1")), &context(client.clone()))
        .await;

    assert!(!output.failed, "{:?}", output.msg);
    assert_eq!(output.data["item"], json!({"id": ITEM_ID}));
    assert_eq!(client.count("get"), 2);
}

#[tokio::test]
async fn test_delete_never_confirmed_is_transient() {
    let client = Arc::new(FakeArmClient::with_resource(json!({"id": ITEM_ID})));
    let output = registry()
        .execute("test_item", &params(absent_args()), &context(client.clone()))
        .await;

    assert!(output.failed);
    assert!(output.changed);
    assert_eq!(output.failure_kind, Some(FailureKind::Transient));
    assert_eq!(client.count("delete"), 1);
}

#[tokio::test]
async fn test_rejected_mutation_is_cloud_failure() {
    let client = Arc::new(FakeArmClient::new().completing(Completion::Reject(
        azrm::arm::CloudError::service(Some(409), Some("Conflict".to_string()), "busy"),
    )));
    let output = registry()
        .execute("test_item", &params(item_args("S1")), &context(client.clone()))
        .await;

    assert!(output.failed);
    assert!(!output.changed);
    assert_eq!(output.failure_kind, Some(FailureKind::Cloud));
    let msg = output.msg.unwrap_or_default();
    assert!(msg.contains("Conflict"));
    assert!(!msg.contains('\n'));
}

// ============================================================================
// Redaction and idempotence
// ============================================================================

#[tokio::test]
async fn test_no_log_values_are_never_published() {
    let client = Arc::new(FakeArmClient::with_resource(json!({
        "id": ITEM_ID,
        "sku": "S1",
        "properties": {"secret": "old-value"},
    })));
    let mut args = item_args("S1");
    args["secret"] = json!("hunter2");
    let context = context(client.clone()).with_diff_mode(true);

    let output = registry()
        .execute("test_item", &params(args), &context)
        .await;

    assert!(!output.failed, "{:?}", output.msg);
    assert_eq!(
        output.data["invocation"]["module_args"]["secret"],
        NO_LOG_MARKER
    );
    let rendered = serde_json::to_string(&output).unwrap();
    assert!(!rendered.contains("hunter2"), "{}", rendered);
    // The service's current value is just as secret as the requested one.
    assert!(!rendered.contains("old-value"), "{}", rendered);
    let diff = output.diff.as_ref().expect("diff mode reports a diff");
    assert_eq!(diff.before["properties"]["secret"], NO_LOG_MARKER);
    assert_eq!(diff.after["properties"]["secret"], NO_LOG_MARKER);

    // The service still receives the real value.
    let mutations = client.mutations();
    assert_eq!(
        mutations[0].body.as_ref().unwrap()["properties"]["secret"],
        "hunter2"
    );
}

#[tokio::test]
async fn test_second_run_is_unchanged() {
    let client = Arc::new(
        FakeArmClient::new()
            .completing(Completion::Immediate(Some(json!({"id": ITEM_ID, "sku": "S1"})))),
    );
    let registry = registry();
    let context = context(client.clone());

    let first = registry
        .execute("test_item", &params(item_args("S1")), &context)
        .await;
    assert!(first.changed);

    // The service now reports what was created.
    let client = Arc::new(FakeArmClient::with_resource(json!({"id": ITEM_ID, "sku": "S1"})));
    let second = registry
        .execute("test_item", &params(item_args("S1")), &common::context(client.clone()))
        .await;
    assert!(!second.changed);
    assert_eq!(first.data["item"], second.data["item"]);
    assert!(client.mutations().is_empty());
}
