//! Unit tests for phonebatch-rdbc connection module

use phonebatch_rdbc::connection::{ConnectionConfig, Encryption, IsolationLevel};
use std::time::Duration;

#[test]
fn test_connection_config_default() {
    let config = ConnectionConfig::default();

    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 1433);
    assert_eq!(config.encryption, Encryption::Required);
    assert!(!config.trust_server_certificate);
    assert_eq!(config.connect_timeout, Duration::from_secs(5));
    assert_eq!(config.query_timeout, Duration::from_secs(60));
    assert_eq!(config.application_name, Some("phonebatch".to_string()));
}

#[test]
fn test_connection_config_new() {
    let config = ConnectionConfig::new("sql01", "CRM");

    assert_eq!(config.host, "sql01");
    assert_eq!(config.database, "CRM");
    assert_eq!(config.address(), "sql01:1433");
}

#[test]
fn test_connection_config_with_timeouts() {
    let config = ConnectionConfig::new("sql01", "CRM")
        .with_connect_timeout(Duration::from_secs(2))
        .with_query_timeout(Duration::ZERO);

    assert_eq!(config.connect_timeout, Duration::from_secs(2));
    assert!(config.query_timeout.is_zero());
}

#[test]
fn test_isolation_level_display() {
    assert_eq!(
        format!("{}", IsolationLevel::ReadUncommitted),
        "READ UNCOMMITTED"
    );
    assert_eq!(
        format!("{}", IsolationLevel::ReadCommitted),
        "READ COMMITTED"
    );
    assert_eq!(format!("{}", IsolationLevel::Snapshot), "SNAPSHOT");
}

#[test]
fn test_encryption_parse_rejects_unknown() {
    let err = "sometimes".parse::<Encryption>().unwrap_err();
    assert!(err.to_string().contains("sometimes"));
}
