//! Error types for phonebatch-rdbc
//!
//! Provides granular error classification for proper retry handling:
//! - Retriable errors (connection loss, timeouts, lock waits, deadlocks)
//! - Non-retriable errors (syntax, type errors, configuration)
//!
//! Driver messages are mapped to a category by [`categorize_message`], the
//! single place where error codes and keywords are pattern-matched.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for phonebatch-rdbc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection-related errors (retriable after reconnect)
    Connection,
    /// Query execution errors
    Query,
    /// Server-reported query timeout (retriable on the same session)
    Timeout,
    /// Lock request timed out, SQL Server error 1222 (retriable)
    LockTimeout,
    /// Chosen as deadlock victim, SQL Server error 1205 (retriable)
    Deadlock,
    /// Configuration error
    Configuration,
    /// Type conversion errors (not retriable)
    TypeConversion,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::Connection | Self::Timeout | Self::LockTimeout | Self::Deadlock
        )
    }

    /// Whether the session that produced this error must be replaced
    #[inline]
    pub const fn is_connection_loss(self) -> bool {
        matches!(self, Self::Connection)
    }
}

/// Main error type for phonebatch-rdbc
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Connection failed or was lost
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution failed
    #[error("query error: {message}")]
    Query {
        message: String,
        code: Option<u32>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Server reported a query timeout
    #[error("timeout: {message}")]
    Timeout { message: String },

    /// Lock wait exceeded `LOCK_TIMEOUT`
    #[error("lock request timed out: {message}")]
    LockTimeout { message: String },

    /// Deadlock detected
    #[error("deadlock detected: {message}")]
    Deadlock { message: String },

    /// Type conversion failed
    #[error("type conversion error: {message}")]
    TypeConversion { message: String },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Query { .. } => ErrorCategory::Query,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::LockTimeout { .. } => ErrorCategory::LockTimeout,
            Self::Deadlock { .. } => ErrorCategory::Deadlock,
            Self::TypeConversion { .. } => ErrorCategory::TypeConversion,
            Self::Configuration { .. } => ErrorCategory::Configuration,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Whether this error means the connection is gone
    #[inline]
    pub fn is_connection_loss(&self) -> bool {
        self.category().is_connection_loss()
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            code: None,
            source: None,
        }
    }

    /// Create a query error carrying the server error number
    pub fn query_with_code(message: impl Into<String>, code: u32) -> Self {
        Self::Query {
            message: message.into(),
            code: Some(code),
            source: None,
        }
    }

    /// Create the error for a statement abandoned after `limit`.
    ///
    /// The client stops reading mid-response, so the TDS stream is unusable
    /// and the session has to be replaced: this is a connection error, not a
    /// [`ErrorCategory::Timeout`].
    pub fn statement_timeout(limit: Duration) -> Self {
        Self::Connection {
            message: format!("statement exceeded {:?} (HYT00), session abandoned", limit),
            source: None,
        }
    }

    /// Create a lock timeout error
    pub fn lock_timeout(message: impl Into<String>) -> Self {
        Self::LockTimeout {
            message: message.into(),
        }
    }

    /// Create a deadlock error
    pub fn deadlock(message: impl Into<String>) -> Self {
        Self::Deadlock {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a type conversion error
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Build an error from a raw driver message, using [`categorize_message`]
    /// to pick the variant. Unrecognized messages become query errors.
    pub fn from_driver_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match categorize_message(&message) {
            Some(ErrorCategory::Deadlock) => Self::Deadlock { message },
            Some(ErrorCategory::LockTimeout) => Self::LockTimeout { message },
            Some(ErrorCategory::Timeout) => Self::Timeout { message },
            Some(ErrorCategory::Connection) => Self::Connection {
                message,
                source: None,
            },
            _ => Self::Query {
                message,
                code: None,
                source: None,
            },
        }
    }
}

/// SQL Server error number for "chosen as deadlock victim"
pub const MSSQL_DEADLOCK_VICTIM: u32 = 1205;
/// SQL Server error number for "lock request time out period exceeded"
pub const MSSQL_LOCK_TIMEOUT: u32 = 1222;

/// Map a server error number to a category, if it is one we know.
pub fn categorize_code(code: u32) -> Option<ErrorCategory> {
    match code {
        MSSQL_DEADLOCK_VICTIM => Some(ErrorCategory::Deadlock),
        MSSQL_LOCK_TIMEOUT => Some(ErrorCategory::LockTimeout),
        // transport closed by the peer
        233 | 10053 | 10054 => Some(ErrorCategory::Connection),
        _ => None,
    }
}

/// Pattern-match a driver or server message against the known transient
/// signatures. Returns `None` for anything unrecognized, which callers treat
/// as fatal.
///
/// The list is not exhaustive: an unknown transient error fails fast instead
/// of being retried.
pub fn categorize_message(message: &str) -> Option<ErrorCategory> {
    let msg = message.to_ascii_lowercase();

    if msg.contains("1205") || msg.contains("deadlock") || msg.contains("40001") {
        return Some(ErrorCategory::Deadlock);
    }
    if msg.contains("1222") || msg.contains("lock request time out") {
        return Some(ErrorCategory::LockTimeout);
    }
    const LINK_FAILURES: &[&str] = &[
        "08s01",
        "08001",
        "communication link failure",
        "connection reset",
        "connection refused",
        "connection aborted",
        "broken pipe",
        "connection closed",
        "connection is closed",
        "connection timed out",
        "unexpected eof",
        "10054",
        "transport-level error",
    ];
    if LINK_FAILURES.iter().any(|needle| msg.contains(needle)) {
        return Some(ErrorCategory::Connection);
    }
    if msg.contains("hyt00") || msg.contains("timeout") || msg.contains("timed out") {
        return Some(ErrorCategory::Timeout);
    }

    None
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Query => write!(f, "query"),
            Self::Timeout => write!(f, "timeout"),
            Self::LockTimeout => write!(f, "lock_timeout"),
            Self::Deadlock => write!(f, "deadlock"),
            Self::Configuration => write!(f, "configuration"),
            Self::TypeConversion => write!(f, "type_conversion"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retriable() {
        assert!(ErrorCategory::Connection.is_retriable());
        assert!(ErrorCategory::Timeout.is_retriable());
        assert!(ErrorCategory::LockTimeout.is_retriable());
        assert!(ErrorCategory::Deadlock.is_retriable());

        assert!(!ErrorCategory::TypeConversion.is_retriable());
        assert!(!ErrorCategory::Query.is_retriable());
        assert!(!ErrorCategory::Configuration.is_retriable());
    }

    #[test]
    fn test_only_connection_is_connection_loss() {
        assert!(ErrorCategory::Connection.is_connection_loss());
        assert!(!ErrorCategory::Deadlock.is_connection_loss());
        assert!(!ErrorCategory::Timeout.is_connection_loss());
    }

    #[test]
    fn test_categorize_message_lock_signatures() {
        assert_eq!(
            categorize_message("Transaction (Process ID 52) was deadlocked on lock resources"),
            Some(ErrorCategory::Deadlock)
        );
        assert_eq!(
            categorize_message("Token error: 'x' on server y executing  on line 1 (code: 1205, state: 51, class: 13)"),
            Some(ErrorCategory::Deadlock)
        );
        assert_eq!(
            categorize_message("SQLSTATE=40001 serialization failure"),
            Some(ErrorCategory::Deadlock)
        );
        assert_eq!(
            categorize_message("Lock request time out period exceeded. (code: 1222)"),
            Some(ErrorCategory::LockTimeout)
        );
        assert_eq!(
            categorize_message("[HYT00] Query timeout expired"),
            Some(ErrorCategory::Timeout)
        );
    }

    #[test]
    fn test_categorize_message_link_failures() {
        assert_eq!(
            categorize_message("[08S01] Communication link failure"),
            Some(ErrorCategory::Connection)
        );
        assert_eq!(
            categorize_message("An existing connection was forcibly closed (os error 10054)"),
            Some(ErrorCategory::Connection)
        );
        assert_eq!(
            categorize_message("Broken pipe (os error 32)"),
            Some(ErrorCategory::Connection)
        );
    }

    #[test]
    fn test_categorize_message_unknown_is_none() {
        assert_eq!(categorize_message("Invalid object name 'dbo.CONTATOS'"), None);
        assert_eq!(categorize_message(""), None);
    }

    #[test]
    fn test_categorize_code() {
        assert_eq!(categorize_code(1205), Some(ErrorCategory::Deadlock));
        assert_eq!(categorize_code(1222), Some(ErrorCategory::LockTimeout));
        assert_eq!(categorize_code(208), None);
    }

    #[test]
    fn test_from_driver_message() {
        assert!(matches!(
            Error::from_driver_message("deadlock victim"),
            Error::Deadlock { .. }
        ));
        assert!(Error::from_driver_message("communication link failure").is_connection_loss());
        assert_eq!(
            Error::from_driver_message("Incorrect syntax near 'FROM'").category(),
            ErrorCategory::Query
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::connection("connection refused");
        assert!(err.to_string().contains("connection refused"));

        let err = Error::statement_timeout(Duration::from_secs(60));
        assert!(err.to_string().contains("HYT00"));
    }

    #[test]
    fn test_statement_timeout_replaces_session() {
        let err = Error::statement_timeout(Duration::from_secs(60));
        assert!(err.is_connection_loss());
        assert_ne!(err.category(), ErrorCategory::Timeout);
    }
}
