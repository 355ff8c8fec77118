//! Connection traits for phonebatch-rdbc
//!
//! Core abstractions for database connectivity:
//! - Connection: a live session with parameterized query execution
//! - ConnectionFactory: opens new sessions from a [`ConnectionConfig`]
//! - IsolationLevel / Encryption: typed session and transport settings

use async_trait::async_trait;
use secrecy::SecretString;
use std::time::Duration;

use crate::error::Result;
use crate::types::{Row, Value};

/// A connection to a database
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a query that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement that returns no rows, returns affected row count
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Factory for creating connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;
}

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// Read uncommitted - dirty reads possible
    ReadUncommitted,
    /// Read committed - no dirty reads (SQL Server default)
    #[default]
    ReadCommitted,
    /// Repeatable read - no non-repeatable reads
    RepeatableRead,
    /// Serializable - full isolation
    Serializable,
    /// Snapshot isolation (SQL Server specific)
    Snapshot,
}

impl IsolationLevel {
    /// Convert to SQL string for SET TRANSACTION statement
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
            Self::Snapshot => "SNAPSHOT",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_sql())
    }
}

/// Transport encryption requested from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encryption {
    /// Encrypt only the login packet
    Off,
    /// Encrypt everything if the server supports it
    On,
    /// Refuse to connect unless everything is encrypted
    #[default]
    Required,
    /// Never encrypt
    NotSupported,
}

impl std::str::FromStr for Encryption {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "no" | "false" | "optional" => Ok(Self::Off),
            "on" => Ok(Self::On),
            // ODBC's `Encrypt=yes` means mandatory encryption
            "yes" | "true" | "required" | "strict" | "mandatory" => Ok(Self::Required),
            "not_supported" | "none" | "disabled" => Ok(Self::NotSupported),
            other => Err(crate::error::Error::config(format!(
                "unknown encryption mode '{}'",
                other
            ))),
        }
    }
}

/// Configuration for creating connections
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Server host name or address
    pub host: String,
    /// Server TCP port
    pub port: u16,
    /// Database to use after login
    pub database: String,
    /// SQL login name
    pub user: String,
    /// SQL login password
    pub password: SecretString,
    /// Transport encryption
    pub encryption: Encryption,
    /// Accept any server certificate
    pub trust_server_certificate: bool,
    /// Login timeout (TCP connect + TDS handshake)
    pub connect_timeout: Duration,
    /// Per-statement timeout (zero disables it)
    pub query_timeout: Duration,
    /// Application name (shown in sys.dm_exec_sessions)
    pub application_name: Option<String>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("encryption", &self.encryption)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .field("connect_timeout", &self.connect_timeout)
            .field("query_timeout", &self.query_timeout)
            .field("application_name", &self.application_name)
            .finish()
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1433,
            database: String::new(),
            user: String::new(),
            password: SecretString::from(String::new()),
            encryption: Encryption::default(),
            trust_server_certificate: false,
            connect_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(60),
            application_name: Some("phonebatch".into()),
        }
    }
}

impl ConnectionConfig {
    /// Create configuration for a host and database
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    /// Set the server port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set SQL login credentials
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = SecretString::from(password.into());
        self
    }

    /// Set transport encryption
    pub fn with_encryption(mut self, encryption: Encryption) -> Self {
        self.encryption = encryption;
        self
    }

    /// Accept any server certificate
    pub fn with_trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = trust;
        self
    }

    /// Set connection (login) timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set per-statement timeout
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Set application name
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// `host:port` pair used for the TCP connect
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_isolation_level_to_sql() {
        assert_eq!(IsolationLevel::ReadCommitted.to_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::Serializable.to_sql(), "SERIALIZABLE");
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_connection_config_builder() {
        let config = ConnectionConfig::new("db.internal", "CRM")
            .with_port(14330)
            .with_credentials("reader", "s3cret")
            .with_encryption(Encryption::On)
            .with_trust_server_certificate(true)
            .with_connect_timeout(Duration::from_secs(3))
            .with_query_timeout(Duration::from_secs(90))
            .with_application_name("lookup");

        assert_eq!(config.address(), "db.internal:14330");
        assert_eq!(config.database, "CRM");
        assert_eq!(config.user, "reader");
        assert_eq!(config.password.expose_secret(), "s3cret");
        assert_eq!(config.encryption, Encryption::On);
        assert!(config.trust_server_certificate);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.query_timeout, Duration::from_secs(90));
        assert_eq!(config.application_name, Some("lookup".into()));
    }

    #[test]
    fn test_connection_config_debug_redacts_password() {
        let config = ConnectionConfig::new("h", "d").with_credentials("u", "hunter2");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_encryption_from_str() {
        assert_eq!("yes".parse::<Encryption>().unwrap(), Encryption::Required);
        assert_eq!("on".parse::<Encryption>().unwrap(), Encryption::On);
        assert_eq!("no".parse::<Encryption>().unwrap(), Encryption::Off);
        assert_eq!("strict".parse::<Encryption>().unwrap(), Encryption::Required);
        assert_eq!(
            "not_supported".parse::<Encryption>().unwrap(),
            Encryption::NotSupported
        );
        assert!("maybe".parse::<Encryption>().is_err());
    }
}
