//! SQL Server backend implementation for phonebatch-rdbc
//!
//! Provides Microsoft SQL Server-specific implementations over tiberius:
//! - Connection with typed (never interpolated) parameters
//! - Client-side statement timeout, since TDS has no per-statement timeout
//! - Mapping of server error numbers and transport failures onto
//!   [`ErrorCategory`](crate::error::ErrorCategory)

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use secrecy::ExposeSecret;

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory, Encryption};
use crate::error::{categorize_code, Error, ErrorCategory, Result};
use crate::types::{Row, Value};

type TdsClient = Client<Compat<TcpStream>>;

/// SQL Server connection
pub struct SqlServerConnection {
    client: Mutex<Option<TdsClient>>,
    query_timeout: Duration,
    /// Set once the TDS stream can no longer be trusted (I/O failure or a
    /// statement abandoned mid-response). Every later call fails fast as a
    /// connection error so the owner replaces the session.
    broken: AtomicBool,
}

impl SqlServerConnection {
    /// Create a new SQL Server connection from config
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let tib_config = tiberius_config(config);

        let login = async {
            let tcp = TcpStream::connect(tib_config.get_addr())
                .await
                .map_err(|e| Error::connection_with_source("Failed to connect", e))?;

            tcp.set_nodelay(true).ok();

            Client::connect(tib_config, tcp.compat_write())
                .await
                .map_err(|e| map_tiberius_error("Failed to authenticate", e))
        };

        let client = match tokio::time::timeout(config.connect_timeout, login).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::connection(format!(
                    "login to {} timed out after {:?}",
                    config.address(),
                    config.connect_timeout
                )))
            }
        };

        Ok(Self {
            client: Mutex::new(Some(client)),
            query_timeout: config.query_timeout,
            broken: AtomicBool::new(false),
        })
    }

    fn check_usable(&self) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(Error::connection(
                "session invalidated by an earlier transport failure",
            ));
        }
        Ok(())
    }

    /// Run a client call under the statement timeout, invalidating the
    /// session when the stream is left in an unknown state.
    async fn guarded<T, F>(&self, call: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let outcome = if self.query_timeout.is_zero() {
            call.await
        } else {
            tokio::time::timeout(self.query_timeout, call)
                .await
                .unwrap_or_else(|_| Err(Error::statement_timeout(self.query_timeout)))
        };

        if let Err(e) = &outcome {
            if e.is_connection_loss() {
                self.broken.store(true, Ordering::SeqCst);
            }
        }
        outcome
    }
}

fn tiberius_config(config: &ConnectionConfig) -> Config {
    let mut tib_config = Config::new();

    tib_config.host(&config.host);
    tib_config.port(config.port);
    tib_config.database(&config.database);
    tib_config.authentication(AuthMethod::sql_server(
        &config.user,
        config.password.expose_secret(),
    ));
    tib_config.encryption(match config.encryption {
        Encryption::Off => EncryptionLevel::Off,
        Encryption::On => EncryptionLevel::On,
        Encryption::Required => EncryptionLevel::Required,
        Encryption::NotSupported => EncryptionLevel::NotSupported,
    });
    if config.trust_server_certificate {
        tib_config.trust_cert();
    }
    if let Some(name) = &config.application_name {
        tib_config.application_name(name);
    }

    tib_config
}

/// Map a tiberius error onto the phonebatch error taxonomy.
///
/// Server errors are classified by error number first, then by message;
/// transport errors always mean the session is gone.
fn map_tiberius_error(context: &str, err: tiberius::error::Error) -> Error {
    use tiberius::error::Error as TdsError;

    match err {
        TdsError::Io { .. } | TdsError::Tls(_) | TdsError::Routing { .. } => {
            Error::connection_with_source(context.to_string(), err)
        }
        TdsError::Server(token) => {
            let code = token.code();
            let message = format!("{}: {} (code {})", context, token.message(), code);
            match categorize_code(code) {
                Some(ErrorCategory::Deadlock) => Error::deadlock(message),
                Some(ErrorCategory::LockTimeout) => Error::lock_timeout(message),
                Some(ErrorCategory::Connection) => Error::connection(message),
                _ => match Error::from_driver_message(message.clone()) {
                    Error::Query { .. } => Error::query_with_code(message, code),
                    categorized => categorized,
                },
            }
        }
        other => Error::from_driver_message(format!("{}: {}", context, other)),
    }
}

/// Owned parameter wrapper for native tiberius parameter binding.
///
/// Parameters are **never interpolated into SQL text**; they are sent as
/// typed protocol-level parameters (sp_executesql).
struct SqlParam(Value);

impl tiberius::ToSql for SqlParam {
    fn to_sql(&self) -> tiberius::ColumnData<'_> {
        use std::borrow::Cow;
        use tiberius::ColumnData;
        use Value::*;

        match &self.0 {
            Null => ColumnData::String(None),
            Bool(b) => ColumnData::Bit(Some(*b)),
            Int16(n) => ColumnData::I16(Some(*n)),
            Int32(n) => ColumnData::I32(Some(*n)),
            Int64(n) => ColumnData::I64(Some(*n)),
            Float64(n) => ColumnData::F64(Some(*n)),
            String(s) => ColumnData::String(Some(Cow::Borrowed(s.as_str()))),
            // ISO 8601 text bound as a typed parameter; SQL Server converts
            // it implicitly into the DATE column.
            Date(d) => ColumnData::String(Some(Cow::Owned(d.format("%Y-%m-%d").to_string()))),
        }
    }
}

#[inline]
fn param_refs(tib_params: &[SqlParam]) -> Vec<&dyn tiberius::ToSql> {
    tib_params
        .iter()
        .map(|p| p as &dyn tiberius::ToSql)
        .collect()
}

/// Convert tiberius column value to a phonebatch Value
fn tiberius_to_value(row: &tiberius::Row, idx: usize) -> Value {
    // try typed columns before text; order matters for BIT vs integers
    if let Ok(Some(v)) = row.try_get::<bool, _>(idx) {
        return Value::Bool(v);
    }
    if let Ok(Some(v)) = row.try_get::<u8, _>(idx) {
        return Value::Int16(i16::from(v));
    }
    if let Ok(Some(v)) = row.try_get::<i16, _>(idx) {
        return Value::Int16(v);
    }
    if let Ok(Some(v)) = row.try_get::<i32, _>(idx) {
        return Value::Int32(v);
    }
    if let Ok(Some(v)) = row.try_get::<i64, _>(idx) {
        return Value::Int64(v);
    }
    if let Ok(Some(v)) = row.try_get::<tiberius::numeric::Numeric, _>(idx) {
        if v.scale() == 0 {
            return Value::Int64(v.value() as i64);
        }
        return Value::String(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<f64, _>(idx) {
        return Value::Float64(v);
    }
    if let Ok(Some(v)) = row.try_get::<&str, _>(idx) {
        return Value::String(v.to_string());
    }

    Value::Null
}

fn tiberius_row_to_row(tib_row: &tiberius::Row) -> Row {
    let columns: Vec<String> = tib_row
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let values: Vec<Value> = (0..columns.len())
        .map(|i| tiberius_to_value(tib_row, i))
        .collect();

    Row::new(columns, values)
}

#[async_trait]
impl Connection for SqlServerConnection {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.check_usable()?;

        let tib_params: Vec<SqlParam> = params.iter().cloned().map(SqlParam).collect();
        let refs = param_refs(&tib_params);
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| Error::connection("connection already closed"))?;

        self.guarded(async {
            let result = client
                .execute(sql, &refs)
                .await
                .map_err(|e| map_tiberius_error("Execute failed", e))?;
            Ok(result.total())
        })
        .await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.check_usable()?;

        let tib_params: Vec<SqlParam> = params.iter().cloned().map(SqlParam).collect();
        let refs = param_refs(&tib_params);
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| Error::connection("connection already closed"))?;

        self.guarded(async {
            let stream = client
                .query(sql, &refs)
                .await
                .map_err(|e| map_tiberius_error("Query failed", e))?;

            let tib_rows = stream
                .into_first_result()
                .await
                .map_err(|e| map_tiberius_error("Failed to fetch rows", e))?;

            Ok(tib_rows.iter().map(tiberius_row_to_row).collect())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let client = self.client.lock().await.take();
        match client {
            Some(client) => client
                .close()
                .await
                .map_err(|e| Error::connection_with_source("Failed to close connection", e)),
            None => Ok(()),
        }
    }
}

/// SQL Server connection factory
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlServerConnectionFactory;

impl SqlServerConnectionFactory {
    /// Create a new SQL Server connection factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionFactory for SqlServerConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let conn = SqlServerConnection::connect(config).await?;
        tracing::debug!(address = %config.address(), "SQL Server session opened");
        Ok(Box::new(conn))
    }
}
