//! Per-chunk phone lookup
//!
//! One chunk is resolved in a fixed sequence on the current session:
//!
//! ```text
//! Pending -> Staging -> Querying -> Cleanup -> Done | Failed
//!              \____________\__________\
//!                 connection lost -> Reconnecting -> Pending
//! ```
//!
//! Staging drops any leftover scratch table, creates it and bulk-inserts the
//! chunk's keys. Querying joins the scratch table against contacts, address
//! history and phone history in one statement. Cleanup drops the scratch
//! table whatever happened before it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use phonebatch_rdbc::connection::Connection;
use phonebatch_rdbc::security::temp_table_name;
use phonebatch_rdbc::types::Row;
use phonebatch_rdbc::{Error as StoreError, Value};
use tracing::{debug, error, warn};

use crate::retry::{classify_connection_loss, classify_statement_error, RetryExecutor};
use crate::session::{Session, SessionManager};
use crate::source::InputRecord;

/// Rows per INSERT statement. Three parameters per row keeps one statement
/// well under SQL Server's 2100 parameter limit.
pub const MAX_INSERT_ROWS: usize = 500;

const COMMIT_SQL: &str = "IF @@TRANCOUNT > 0 COMMIT TRANSACTION";

/// Where a chunk is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPhase {
    Pending,
    Staging,
    Querying,
    Cleanup,
    Done,
    Failed,
    Reconnecting,
}

impl fmt::Display for ChunkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Staging => "staging",
            Self::Querying => "querying",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// What to look up and how to format it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupConfig {
    /// Scratch table name without the `#`
    pub scratch_table: String,
    /// `TIPO_TELEFONE` value of mobile numbers
    pub phone_type_code: i32,
    /// Prefix put in front of area code and number
    pub country_code: String,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            scratch_table: "phone_lookup".into(),
            phone_type_code: 3,
            country_code: "55".into(),
        }
    }
}

/// A formatted phone number: country code, area code, number
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneResult(String);

impl PhoneResult {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves chunks of [`InputRecord`] to phone numbers
pub struct BatchResolver {
    lookup: LookupConfig,
    autocommit: bool,
    retry: Arc<RetryExecutor>,
    table: String,
    drop_sql: String,
    create_sql: String,
    lookup_sql: String,
}

impl BatchResolver {
    /// Build a resolver. Fails if the scratch table name is not a safe
    /// identifier.
    pub fn new(
        lookup: LookupConfig,
        autocommit: bool,
        retry: Arc<RetryExecutor>,
    ) -> phonebatch_rdbc::Result<Self> {
        let table = temp_table_name(&lookup.scratch_table)?;
        let drop_sql = format!(
            "IF OBJECT_ID('tempdb..{t}') IS NOT NULL DROP TABLE {t}",
            t = table
        );
        let create_sql = format!(
            "CREATE TABLE {} (birth_date DATE NOT NULL, city VARCHAR(40) NOT NULL, state VARCHAR(2) NOT NULL)",
            table
        );
        let lookup_sql = format!(
            "SELECT DISTINCT t.DDD, t.TELEFONE \
             FROM {} s \
             JOIN [dbo].[CONTATOS] c \
               ON c.NASC >= s.birth_date AND c.NASC < DATEADD(DAY, 1, s.birth_date) \
             JOIN [dbo].[HISTORICO_ENDERECOS] e \
               ON e.CONTATOS_ID = c.CONTATOS_ID AND e.CIDADE = s.city AND e.UF = s.state \
             JOIN [dbo].[HISTORICO_TELEFONES] t \
               ON t.CONTATOS_ID = c.CONTATOS_ID \
             WHERE t.TIPO_TELEFONE = @P1",
            table
        );

        Ok(Self {
            lookup,
            autocommit,
            retry,
            table,
            drop_sql,
            create_sql,
            lookup_sql,
        })
    }

    /// Session-scoped scratch table name, including the `#`
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Resolve one chunk on `session`.
    ///
    /// Every statement is retried on its own for deadlocks, lock timeouts and
    /// server-side query timeouts. Any failure left after that is logged and
    /// returned once cleanup has run; a lost connection is the only one the
    /// caller replays.
    pub async fn resolve(
        &self,
        session: &Session,
        records: &[InputRecord],
    ) -> phonebatch_rdbc::Result<Vec<PhoneResult>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let conn = session.connection();
        let mut phase = ChunkPhase::Pending;
        let outcome = self.stage_and_query(conn, records, &mut phase).await;
        let failed_in = phase;

        debug!("Session {}: chunk phase {}", session.id(), ChunkPhase::Cleanup);
        self.cleanup(conn).await;

        match outcome {
            Ok(phones) => {
                debug!(
                    "Session {}: chunk phase {} ({} records, {} phones)",
                    session.id(),
                    ChunkPhase::Done,
                    records.len(),
                    phones.len()
                );
                Ok(phones)
            }
            Err(e) if e.is_connection_loss() => {
                warn!(
                    "Session {}: connection lost while {}: {}",
                    session.id(),
                    failed_in,
                    e
                );
                Err(e)
            }
            Err(e) => {
                error!(
                    "Session {}: chunk phase {} while {} ({} records): {}",
                    session.id(),
                    ChunkPhase::Failed,
                    failed_in,
                    records.len(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Resolve one chunk, reconnecting and replaying it from the top when
    /// the connection drops.
    ///
    /// Replays are bounded by the retry policy's `max_retries`. Any other
    /// error fails the chunk at once.
    ///
    /// `slot` holds the run's session. It is replaced on reconnect and left
    /// empty if a reconnect fails, in which case the next call starts by
    /// reconnecting.
    pub async fn resolve_with_reconnect(
        &self,
        sessions: &SessionManager,
        slot: &mut Option<Session>,
        records: &[InputRecord],
    ) -> crate::Result<Vec<PhoneResult>> {
        let mut state = self.retry.state();
        loop {
            let attempt = match slot.as_ref() {
                Some(session) => self.resolve(session, records).await,
                None => Err(StoreError::connection("no open session")),
            };

            let err = match attempt {
                Ok(phones) => return Ok(phones),
                Err(err) => err,
            };

            let classification = classify_connection_loss(&err);
            if !self
                .retry
                .backoff("chunk", &mut state, &err, classification)
                .await
            {
                return Err(err.into());
            }

            debug!("Chunk phase {}", ChunkPhase::Reconnecting);
            *slot = Some(sessions.reconnect(slot.take()).await?);
        }
    }

    async fn stage_and_query(
        &self,
        conn: &dyn Connection,
        records: &[InputRecord],
        phase: &mut ChunkPhase,
    ) -> phonebatch_rdbc::Result<Vec<PhoneResult>> {
        *phase = ChunkPhase::Staging;
        self.run_statement(conn, "drop scratch table", &self.drop_sql, &[])
            .await?;
        self.run_statement(conn, "create scratch table", &self.create_sql, &[])
            .await?;
        for slice in records.chunks(MAX_INSERT_ROWS) {
            let sql = insert_sql(&self.table, slice.len());
            let params = insert_params(slice);
            self.run_statement(conn, "stage records", &sql, &params)
                .await?;
        }

        *phase = ChunkPhase::Querying;
        let params = [Value::Int32(self.lookup.phone_type_code)];
        let params = &params[..];
        let sql = self.lookup_sql.as_str();
        let rows = self
            .retry
            .execute(
                "phone lookup",
                move || conn.query(sql, params),
                classify_statement_error,
            )
            .await?;

        Ok(self.format_rows(&rows))
    }

    async fn cleanup(&self, conn: &dyn Connection) {
        if let Err(e) = self
            .run_statement(conn, "drop scratch table", &self.drop_sql, &[])
            .await
        {
            warn!("Scratch table cleanup failed: {}", e);
        }
        if !self.autocommit {
            if let Err(e) = self.run_statement(conn, "commit", COMMIT_SQL, &[]).await {
                warn!("Commit after chunk failed: {}", e);
            }
        }
    }

    async fn run_statement(
        &self,
        conn: &dyn Connection,
        op_name: &str,
        sql: &str,
        params: &[Value],
    ) -> phonebatch_rdbc::Result<u64> {
        self.retry
            .execute(
                op_name,
                move || conn.execute(sql, params),
                classify_statement_error,
            )
            .await
    }

    fn format_rows(&self, rows: &[Row]) -> Vec<PhoneResult> {
        let mut seen = HashSet::with_capacity(rows.len());
        let mut phones = Vec::with_capacity(rows.len());
        for row in rows {
            let area = row.get(0).and_then(Value::to_text);
            let number = row.get(1).and_then(Value::to_text);
            let (Some(area), Some(number)) = (area, number) else {
                debug!("Skipping lookup row with missing area code or number");
                continue;
            };
            if area.is_empty() || number.is_empty() {
                continue;
            }
            let phone = format!("{}{}{}", self.lookup.country_code, area, number);
            if seen.insert((area, number)) {
                phones.push(PhoneResult(phone));
            }
        }
        phones
    }
}

fn insert_sql(table: &str, rows: usize) -> String {
    let mut sql = format!("INSERT INTO {} (birth_date, city, state) VALUES ", table);
    for i in 0..rows {
        if i > 0 {
            sql.push_str(", ");
        }
        let p = i * 3;
        sql.push_str(&format!("(@P{}, @P{}, @P{})", p + 1, p + 2, p + 3));
    }
    sql
}

fn insert_params(records: &[InputRecord]) -> Vec<Value> {
    let mut params = Vec::with_capacity(records.len() * 3);
    for record in records {
        params.push(Value::Date(record.birth_date));
        params.push(Value::String(record.city.clone()));
        params.push(Value::String(record.state.clone()));
    }
    params
}
