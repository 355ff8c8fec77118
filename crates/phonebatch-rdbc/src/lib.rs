//! # phonebatch-rdbc
//!
//! Relational database connectivity for phonebatch.
//!
//! This crate provides the narrow interface the lookup pipeline needs to talk
//! to SQL Server, plus the error taxonomy its retry logic is built on.
//!
//! ## Features
//!
//! - **Connection traits**: [`Connection`](connection::Connection) and
//!   [`ConnectionFactory`](connection::ConnectionFactory), so the pipeline can
//!   be driven by SQL Server or by an in-memory store in tests
//! - **SQL Server backend**: tiberius over tokio with typed parameters and a
//!   client-side statement timeout
//! - **Error classification**: every error carries an
//!   [`ErrorCategory`](error::ErrorCategory); driver messages are categorized
//!   in one place ([`categorize_message`](error::categorize_message))
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use phonebatch_rdbc::prelude::*;
//! use phonebatch_rdbc::sqlserver::SqlServerConnectionFactory;
//!
//! let config = ConnectionConfig::new("db.internal", "CRM")
//!     .with_credentials("reader", "secret")
//!     .with_trust_server_certificate(true);
//!
//! let conn = SqlServerConnectionFactory::new().connect(&config).await?;
//! let rows = conn.query("SELECT 1 AS one", &[]).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `sqlserver` (default) - SQL Server support via tiberius

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod security;
pub mod types;

#[cfg(feature = "sqlserver")]
pub mod sqlserver;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{categorize_message, Error, ErrorCategory, Result};

    pub use crate::types::{Row, Value};

    pub use crate::connection::{
        Connection, ConnectionConfig, ConnectionFactory, Encryption, IsolationLevel,
    };

    pub use crate::security::{temp_table_name, validate_sql_identifier};
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
pub use types::Value;
