//! Crate-level integration and BDD tests.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use crate::capability::StaticCapability;
use crate::config::PluginConfig;
use crate::integrity::{HashAlgorithm, SecureConfig, digest_file};
use crate::registry::PluginRegistry;
use crate::supervisor::PluginStatus;

pub(crate) mod support;

use self::support::{ConnectPlan, FakeClient, FakeConnector, manual_context, wait_until};

#[test]
fn end_to_end_registry_supervises_verified_plugin() {
    let dir = TempDir::new().expect("temp dir");
    let executable = dir.path().join("kv");
    fs::write(&executable, b"kv plugin build 7").expect("write plugin");
    let digest = digest_file(&executable, HashAlgorithm::Sha512).expect("digest");

    let connector = FakeConnector::with_plans([
        ConnectPlan::Succeed(FakeClient::failing_from(1)),
        ConnectPlan::Succeed(FakeClient::failing_from(1)),
    ]);
    let (context, ticks) = manual_context(&connector);
    let registry = PluginRegistry::new(context);
    registry.register_capability("storage", "kv", Arc::new(StaticCapability::new("kv/v1")));

    let config = PluginConfig::new("01", "kv", executable.clone())
        .with_secure_config(SecureConfig::new(HashAlgorithm::Sha512, digest));
    let supervisor = registry.add_plugin("storage", config).expect("add plugin");
    assert_eq!(supervisor.status(), PluginStatus::Running);

    ticks.send(()).expect("tick");
    assert!(wait_until(|| connector.connects() == 2));
    assert!(wait_until(|| supervisor.status() == PluginStatus::Running));

    fs::write(&executable, b"tampered").expect("tamper plugin");
    ticks.send(()).expect("tick");
    assert!(wait_until(|| supervisor.status() == PluginStatus::Failed));
    assert_eq!(connector.connects(), 2, "a tampered binary is never launched");

    registry.shutdown();
    assert!(supervisor.is_stopped());
    assert!(!supervisor.is_listening());
}
