//! Unit tests for phonebatch-rdbc error module

use phonebatch_rdbc::error::{categorize_message, Error, ErrorCategory};
use std::time::Duration;

#[test]
fn test_error_connection() {
    let err = Error::connection("Failed to connect");

    assert_eq!(err.category(), ErrorCategory::Connection);
    assert!(err.to_string().contains("Failed to connect"));
    assert!(err.is_retriable());
    assert!(err.is_connection_loss());
}

#[test]
fn test_error_config() {
    let err = Error::config("Invalid port");

    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert!(err.to_string().contains("Invalid port"));
    assert!(!err.is_retriable());
}

#[test]
fn test_error_query() {
    let err = Error::query_with_code("Invalid object name 'dbo.CONTATOS'", 208);

    assert_eq!(err.category(), ErrorCategory::Query);
    assert!(err.to_string().contains("Invalid object name"));
    assert!(!err.is_retriable());
    assert!(matches!(err, Error::Query { code: Some(208), .. }));
}

#[test]
fn test_error_deadlock_and_lock_timeout_are_retriable_without_reconnect() {
    let deadlock = Error::deadlock("victim");
    let lock = Error::lock_timeout("1222");

    assert!(deadlock.is_retriable());
    assert!(lock.is_retriable());
    assert!(!deadlock.is_connection_loss());
    assert!(!lock.is_connection_loss());
}

#[test]
fn test_error_statement_timeout_is_connection_loss() {
    let err = Error::statement_timeout(Duration::from_secs(60));

    assert_eq!(err.category(), ErrorCategory::Connection);
    assert!(err.to_string().contains("HYT00"));
    assert!(err.is_connection_loss());
}

#[test]
fn test_server_timeout_stays_on_session() {
    let err = Error::from_driver_message("[HYT00] Query timeout expired");

    assert_eq!(err.category(), ErrorCategory::Timeout);
    assert!(err.is_retriable());
    assert!(!err.is_connection_loss());
}

#[test]
fn test_error_type_conversion() {
    let err = Error::type_conversion("Cannot convert DATE to INT");

    assert_eq!(err.category(), ErrorCategory::TypeConversion);
    assert!(err.to_string().contains("Cannot convert"));
}

#[test]
fn test_categorize_message_is_case_insensitive() {
    assert_eq!(
        categorize_message("TRANSACTION WAS DEADLOCKED"),
        Some(ErrorCategory::Deadlock)
    );
    assert_eq!(
        categorize_message("[Microsoft][ODBC Driver 18] hyt00 query timeout expired"),
        Some(ErrorCategory::Timeout)
    );
    assert_eq!(
        categorize_message("Connection Reset by peer"),
        Some(ErrorCategory::Connection)
    );
}

#[test]
fn test_error_category_display() {
    assert_eq!(ErrorCategory::LockTimeout.to_string(), "lock_timeout");
    assert_eq!(ErrorCategory::Deadlock.to_string(), "deadlock");
    assert_eq!(ErrorCategory::Connection.to_string(), "connection");
}
