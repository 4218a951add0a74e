//! Unit tests for plugin configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;

use super::*;
use crate::capability::StaticCapability;

fn config() -> PluginConfig {
    PluginConfig::new("01", "kv", PathBuf::from("/opt/plugins/kv"))
}

#[test]
fn defaults_follow_host_configuration() {
    let config = config();
    assert_eq!(config.id(), "01");
    assert_eq!(config.name(), "kv");
    assert_eq!(config.start_timeout(), tether_config::default_start_timeout());
    assert_eq!(config.allowed_protocols(), &[Protocol::NetRpc]);
    assert_eq!(config.handshake().protocol_version(), 1);
    assert!(config.secure_config().is_none());
    assert!(config.tls().is_none());
    assert!(config.capabilities().is_empty());
}

#[test]
fn command_line_places_prefix_first() {
    let config = config().with_prefix_command(vec!["java".into(), "-jar".into()]);
    assert_eq!(
        config.command_line(),
        vec![
            String::from("java"),
            String::from("-jar"),
            String::from("/opt/plugins/kv")
        ]
    );
}

#[test]
fn versioned_capabilities_extend_supported_versions() {
    let mut set = CapabilitySet::new();
    set.insert("kv", Arc::new(StaticCapability::new("kv.v2")));
    let config = config().with_versioned_capabilities(2, set);
    assert!(config.supports_protocol_version(1));
    assert!(config.supports_protocol_version(2));
    assert!(!config.supports_protocol_version(3));
}

#[rstest]
#[case::netrpc("netrpc", Protocol::NetRpc)]
#[case::grpc("GRPC", Protocol::Grpc)]
fn protocol_parses_case_insensitively(#[case] raw: &str, #[case] expected: Protocol) {
    assert_eq!(raw.parse::<Protocol>().expect("parse"), expected);
    assert_eq!(expected.to_string(), expected.as_str());
}

#[test]
fn protocol_rejects_unknown_name() {
    let err = "http".parse::<Protocol>().expect_err("should fail");
    assert!(matches!(err, PluginError::Validation { .. }));
}

#[test]
fn host_default_start_timeout_fills_unset_timeout() {
    let config = config().with_default_start_timeout(Duration::from_secs(7));
    assert_eq!(config.start_timeout(), Duration::from_secs(7));
}

#[test]
fn explicit_start_timeout_wins_over_host_default() {
    let config = config()
        .with_start_timeout(Duration::from_secs(3))
        .with_default_start_timeout(Duration::from_secs(7));
    assert_eq!(config.start_timeout(), Duration::from_secs(3));
}

#[rstest]
#[case::plain("kv", "tether-health-kv")]
#[case::interior_nul("kv\0x", "tether-health-kv?x")]
fn thread_names_never_contain_nul(#[case] plugin: &str, #[case] expected: &str) {
    assert_eq!(thread_name("health", plugin), expected);
}
