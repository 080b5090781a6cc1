#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use aclgate_gateway::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
supervision:
  grace_timout_ms: 5000 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.response_code().as_str(), "INVALID");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.gateway.apps_dir, "/opt/aclgate/apps");
    assert_eq!(cfg.gateway.object_path_root, "/gw");
    assert_eq!(cfg.supervision.grace_timeout_ms, 60000);
    assert!(cfg.policy.reload_command.is_empty());
}

#[test]
fn rejects_unsupported_version() {
    assert!(config::load_from_str("version: 2\n").is_err());
}

#[test]
fn poll_interval_must_fit_in_grace_window() {
    let bad = r#"
version: 1
supervision:
  grace_timeout_ms: 100
  poll_interval_ms: 500
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn object_path_root_must_be_absolute() {
    let bad = r#"
version: 1
gateway:
  object_path_root: "gw/"
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn reload_command_is_kept_verbatim() {
    let ok = r#"
version: 1
policy:
  reload_command: ["dbus-send", "--system", "--type=method_call"]
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.policy.reload_command[0], "dbus-send");
    assert_eq!(cfg.policy.reload_command.len(), 3);
}
