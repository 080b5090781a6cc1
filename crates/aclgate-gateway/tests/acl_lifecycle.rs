#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::atomic::Ordering;

use serde_json::json;

use aclgate_core::error::ResponseCode;
use aclgate_core::ident::AppIdentifier;
use aclgate_core::manifest::InterfaceDecl;
use aclgate_core::protocol::admin::AdminResponse;
use aclgate_core::protocol::notify::OperationalStatus;
use aclgate_core::rules::AclStatus;
use aclgate_gateway::store::DocKey;

use common::{acl_id, TestGateway, LIGHT_APP, REMOTE_DEVICE, REMOTE_HEX};

fn create(gw: &TestGateway, name: &str, status: &str) -> AdminResponse {
    gw.call(json!({
        "op": "create_acl",
        "app_id": LIGHT_APP,
        "status": status,
        "name": name,
        "exposed_services": [
            { "object_path": "/light/main", "interfaces": ["org.x.OnOff"] }
        ],
    }))
}

fn set_status(gw: &TestGateway, acl: &str, status: &str) -> AdminResponse {
    gw.call(json!({
        "op": "update_acl_status",
        "app_id": LIGHT_APP,
        "acl_id": acl,
        "status": status,
    }))
}

fn operational(gw: &TestGateway) -> OperationalStatus {
    match gw.call(json!({ "op": "get_app_status", "app_id": LIGHT_APP })) {
        AdminResponse::AppStatus(s) => s.status.operational,
        other => panic!("unexpected {other:?}"),
    }
}

fn get_acl_status(gw: &TestGateway, acl: &str) -> AclStatus {
    match gw.call(json!({ "op": "get_acl", "app_id": LIGHT_APP, "acl_id": acl })) {
        AdminResponse::Acl(v) => v.status,
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn activating_acl_starts_app_exactly_once() {
    let gw = TestGateway::booted();
    assert_eq!(gw.process.spawn_count(), 0);
    assert_eq!(operational(&gw), OperationalStatus::Stopped);

    let first = create(&gw, "Living Room", "active");
    assert_eq!(first.code(), ResponseCode::Success);
    assert_eq!(acl_id(&first), "LivingRoom");
    assert_eq!(gw.process.spawn_count(), 1);
    assert_eq!(operational(&gw), OperationalStatus::Running);

    let second = create(&gw, "Living Room", "active");
    assert_eq!(acl_id(&second), "LivingRoom1");
    assert_eq!(gw.process.spawn_count(), 1);
    assert_eq!(gw.transport.count(LIGHT_APP, "acl_updated"), 2);

    let spec = gw.process.spawned.lock().unwrap()[0].clone();
    assert_eq!(spec.user, LIGHT_APP);
    assert!(spec.program.ends_with("lightapp/bin/light-connector"));
    assert_eq!(spec.args, vec!["--verbose".to_string()]);
    assert_eq!(spec.env, vec![("RUST_LOG".to_string(), "info".to_string())]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn inactive_acl_does_not_start_app() {
    let gw = TestGateway::booted();
    let resp = create(&gw, "Later", "inactive");
    assert_eq!(resp.code(), ResponseCode::Success);
    assert_eq!(gw.process.spawn_count(), 0);
    // nothing active changed, so no signal either
    assert_eq!(gw.transport.count(LIGHT_APP, "acl_updated"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deactivating_last_active_acl_stops_app() {
    let gw = TestGateway::booted();
    let a = acl_id(&create(&gw, "a", "active"));
    let b = acl_id(&create(&gw, "b", "active"));

    assert_eq!(set_status(&gw, &a, "inactive").code(), ResponseCode::Success);
    gw.settle().await;
    assert!(gw.running(LIGHT_APP), "another acl is still active");

    assert_eq!(set_status(&gw, &b, "inactive").code(), ResponseCode::Success);
    gw.settle().await;
    assert!(!gw.running(LIGHT_APP));
    assert_eq!(operational(&gw), OperationalStatus::Stopped);
    assert_eq!(gw.transport.count(LIGHT_APP, "shutdown_app"), 1);
    assert_eq!(gw.process.kill_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_status_is_a_noop() {
    let gw = TestGateway::booted();
    let a = acl_id(&create(&gw, "a", "active"));
    let writes = gw.store.write_count();

    assert_eq!(set_status(&gw, &a, "active").code(), ResponseCode::Success);
    assert_eq!(gw.store.write_count(), writes);
    assert_eq!(gw.transport.count(LIGHT_APP, "acl_updated"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn grace_expiry_kills_exactly_once() {
    let gw = TestGateway::booted();
    gw.transport.cooperative.store(false, Ordering::SeqCst);

    let a = acl_id(&create(&gw, "a", "active"));
    set_status(&gw, &a, "inactive");
    gw.settle().await;

    assert!(!gw.running(LIGHT_APP));
    assert_eq!(gw.process.kill_count(), 1);
    assert_eq!(gw.transport.count(LIGHT_APP, "shutdown_app"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleting_unknown_acl_changes_nothing() {
    let gw = TestGateway::booted();
    create(&gw, "a", "active");
    let writes = gw.store.write_count();
    let reloads = gw.transport.reload_count();

    let resp = gw.call(json!({ "op": "delete_acl", "app_id": LIGHT_APP, "acl_id": "nope" }));
    assert_eq!(resp.code(), ResponseCode::AclNotFound);
    assert!(matches!(resp, AdminResponse::Error { .. }));

    assert_eq!(gw.store.write_count(), writes);
    assert_eq!(gw.transport.reload_count(), reloads);
    assert_eq!(gw.process.spawn_count(), 1);
    match gw.call(json!({ "op": "list_acls", "app_id": LIGHT_APP })) {
        AdminResponse::Acls { acls } => assert_eq!(acls.len(), 1),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleting_active_acl_stops_app() {
    let gw = TestGateway::booted();
    let a = acl_id(&create(&gw, "a", "active"));

    let resp = gw.call(json!({ "op": "delete_acl", "app_id": LIGHT_APP, "acl_id": a }));
    assert_eq!(resp.code(), ResponseCode::Success);
    gw.settle().await;
    assert!(!gw.running(LIGHT_APP));
    assert!(gw.store.get(&DocKey::acl(LIGHT_APP, &a)).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn persistence_failure_rolls_back() {
    let gw = TestGateway::booted();
    let a = acl_id(&create(&gw, "a", "active"));

    gw.store.set_fail_writes(true);
    let resp = set_status(&gw, &a, "inactive");
    assert_eq!(resp.code(), ResponseCode::PersistenceError);

    let resp = gw.call(json!({
        "op": "update_acl_custom_metadata",
        "app_id": LIGHT_APP,
        "acl_id": a,
        "custom_metadata": { "room": "kitchen" },
    }));
    assert_eq!(resp.code(), ResponseCode::PersistenceError);
    gw.store.set_fail_writes(false);

    assert_eq!(get_acl_status(&gw, &a), AclStatus::Active);
    match gw.call(json!({ "op": "get_acl", "app_id": LIGHT_APP, "acl_id": a })) {
        AdminResponse::Acl(v) => assert!(v.custom_metadata.is_empty()),
        other => panic!("unexpected {other:?}"),
    }
    gw.settle().await;
    assert!(gw.running(LIGHT_APP));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_create_stores_nothing() {
    let gw = TestGateway::booted();
    gw.store.set_fail_writes(true);

    let resp = create(&gw, "a", "active");
    assert_eq!(resp.code(), ResponseCode::PersistenceError);
    gw.store.set_fail_writes(false);

    match gw.call(json!({ "op": "list_acls", "app_id": LIGHT_APP })) {
        AdminResponse::Acls { acls } => assert!(acls.is_empty()),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(gw.process.spawn_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_acl_write_leaves_metadata_untouched() {
    let gw = TestGateway::booted();
    let a = acl_id(&create(&gw, "a", "inactive"));
    let app_key = format!("{REMOTE_DEVICE}_{REMOTE_HEX}_APP_NAME");
    let remote = AppIdentifier::new(REMOTE_HEX, REMOTE_DEVICE).unwrap();

    gw.store.set_fail_key(Some(DocKey::acl(LIGHT_APP, &a)));
    let resp = gw.call(json!({
        "op": "update_acl",
        "app_id": LIGHT_APP,
        "acl_id": a,
        "name": "a",
        "metadata": { app_key.clone(): "Thermostat" },
    }));
    assert_eq!(resp.code(), ResponseCode::PersistenceError);

    gw.store.set_fail_key(Some(DocKey::acl(LIGHT_APP, "b")));
    let resp = gw.call(json!({
        "op": "create_acl",
        "app_id": LIGHT_APP,
        "name": "b",
        "metadata": { app_key: "Hallway thermostat" },
    }));
    assert_eq!(resp.code(), ResponseCode::PersistenceError);
    gw.store.set_fail_key(None);

    assert!(gw.state.metadata().unwrap().get(&remote).is_none());
    let stored = gw.store.get(&DocKey::Metadata).unwrap_or_default();
    assert!(!stored.contains("Thermostat"));
    assert!(!stored.contains("Hallway"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partially_valid_rules_are_reported() {
    let gw = TestGateway::booted();
    let resp = gw.call(json!({
        "op": "create_acl",
        "app_id": LIGHT_APP,
        "name": "mixed",
        "exposed_services": [
            { "object_path": "/light/main", "interfaces": ["org.x.OnOff", "org.x.Bogus"] },
            { "object_path": "/nowhere", "interfaces": ["org.x.OnOff"] }
        ],
    }));

    let AdminResponse::AclWrite(w) = resp else {
        panic!("expected acl write");
    };
    assert_eq!(w.code, ResponseCode::Success);
    assert!(w.is_partial());
    assert!(w.invalid_interfaces.contains(&InterfaceDecl::named("org.x.Bogus")));
    let rejected: Vec<&str> = w.rejected_exposed.iter().map(|r| r.object_path.as_str()).collect();
    assert_eq!(rejected, vec!["/light/main", "/nowhere"]);

    let AdminResponse::Acl(view) =
        gw.call(json!({ "op": "get_acl", "app_id": LIGHT_APP, "acl_id": w.acl_id.unwrap() }))
    else {
        panic!("expected acl");
    };
    let stored: Vec<_> = view.exposed_services.iter().filter(|r| r.configured).collect();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].object_path, "/light/main");
    assert!(stored[0].interfaces.contains("org.x.OnOff"));
    assert!(!stored[0].interfaces.contains("org.x.Bogus"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn metadata_names_come_back_with_the_acl() {
    let gw = TestGateway::booted();
    let app_key = format!("{REMOTE_DEVICE}_{REMOTE_HEX}_APP_NAME");
    let resp = gw.call(json!({
        "op": "create_acl",
        "app_id": LIGHT_APP,
        "name": "remote",
        "remoted_apps": [
            { "app_id": REMOTE_HEX, "device_id": REMOTE_DEVICE,
              "rules": [ { "object_path": "/thermo", "interfaces": ["org.x.Temp"] } ] }
        ],
        "metadata": { app_key.clone(): "Thermostat" },
    }));
    assert_eq!(resp.code(), ResponseCode::Success);

    let AdminResponse::Acl(view) =
        gw.call(json!({ "op": "get_acl", "app_id": LIGHT_APP, "acl_id": acl_id(&resp) }))
    else {
        panic!("expected acl");
    };
    assert_eq!(view.metadata.get(&app_key).map(String::as_str), Some("Thermostat"));
    assert_eq!(view.remoted_apps.len(), 1);

    let bad = gw.call(json!({
        "op": "update_acl_metadata",
        "app_id": LIGHT_APP,
        "acl_id": acl_id(&resp),
        "metadata": { "garbage": "x" },
    }));
    assert_eq!(bad.code(), ResponseCode::MetadataError);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_requires_an_active_acl() {
    let gw = TestGateway::booted();
    let resp = gw.call(json!({ "op": "restart_app", "app_id": LIGHT_APP }));
    assert_eq!(resp.code(), ResponseCode::Invalid);

    create(&gw, "a", "active");
    let resp = gw.call(json!({ "op": "restart_app", "app_id": LIGHT_APP }));
    assert_eq!(resp.code(), ResponseCode::Success);
    gw.settle().await;

    assert_eq!(gw.process.spawn_count(), 2);
    assert!(gw.running(LIGHT_APP));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_app_is_reported() {
    let gw = TestGateway::booted();
    let resp = gw.call(json!({ "op": "list_acls", "app_id": "ghost" }));
    assert_eq!(resp.code(), ResponseCode::AppNotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn manifest_rules_mark_consumed_capabilities() {
    let gw = TestGateway::booted();
    create(&gw, "a", "inactive");

    let AdminResponse::ManifestRules(view) =
        gw.call(json!({ "op": "get_manifest_rules", "app_id": LIGHT_APP }))
    else {
        panic!("expected manifest rules");
    };
    let configured: Vec<(&str, bool)> = view
        .exposed_services
        .iter()
        .map(|r| (r.object_path.as_str(), r.configured))
        .collect();
    assert_eq!(configured, vec![("/light", false), ("/light/main", true)]);
    assert_eq!(view.remoted_services.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn admin_requests_are_counted() {
    let gw = TestGateway::booted();
    create(&gw, "a", "inactive");
    gw.call(json!({ "op": "list_acls", "app_id": "ghost" }));

    let AdminResponse::Metrics { text } = gw.call(json!({ "op": "metrics" })) else {
        panic!("expected metrics");
    };
    assert!(text.contains("aclgate_admin_requests_total{code=\"SUCCESS\",op=\"create_acl\"} 1"));
    assert!(text.contains("aclgate_admin_requests_total{code=\"APP_NOT_FOUND\",op=\"list_acls\"} 1"));
}
