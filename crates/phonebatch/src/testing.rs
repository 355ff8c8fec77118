//! Testing utilities for the lookup pipeline
//!
//! [`MockStore`] is an in-memory stand-in for the SQL Server database. It
//! implements [`ConnectionFactory`], keeps a per-connection scratch table,
//! answers the phone lookup join from seeded contacts and can inject faults
//! into specific kinds of statements.
//!
//! # Example
//!
//! ```rust,ignore
//! use phonebatch::testing::{MockStore, StatementKind};
//!
//! let store = MockStore::new();
//! store.seed_contact(birth, "Recife", "PE", 81, "999990000", 3);
//! store.fail_next(StatementKind::Lookup, Error::deadlock("victim"));
//!
//! let orchestrator = Orchestrator::new(&config, Arc::new(store.clone()), sink)?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use phonebatch_rdbc::connection::{Connection, ConnectionConfig, ConnectionFactory};
use phonebatch_rdbc::types::Row;
use phonebatch_rdbc::{Error, Result, Value};

/// Statement categories the mock tells apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// `SET ...` session policy
    Policy,
    DropScratch,
    CreateScratch,
    Insert,
    Lookup,
    Commit,
    Other,
}

impl StatementKind {
    /// Classify a statement by its text
    pub fn of(sql: &str) -> Self {
        let upper = sql.trim_start().to_ascii_uppercase();
        if upper.starts_with("SET ") {
            Self::Policy
        } else if upper.contains("DROP TABLE") {
            Self::DropScratch
        } else if upper.starts_with("CREATE TABLE") {
            Self::CreateScratch
        } else if upper.starts_with("INSERT INTO") {
            Self::Insert
        } else if upper.starts_with("SELECT") {
            Self::Lookup
        } else if upper.contains("COMMIT") {
            Self::Commit
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone)]
struct Contact {
    birth: NaiveDateTime,
    city: String,
    state: String,
    area: i16,
    number: String,
    phone_type: i32,
}

#[derive(Debug, Clone)]
struct StagedKey {
    birth_date: NaiveDate,
    city: String,
    state: String,
}

#[derive(Default)]
struct StoreState {
    contacts: Vec<Contact>,
    faults: Vec<(StatementKind, Error)>,
    refuse_connects: usize,
    connects: usize,
    closes: usize,
    statements: Vec<(StatementKind, String)>,
}

/// In-memory database for pipeline tests
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a contact with one address and one phone
    pub fn seed_contact(
        &self,
        birth: NaiveDateTime,
        city: &str,
        state: &str,
        area: i16,
        number: &str,
        phone_type: i32,
    ) {
        self.state.lock().contacts.push(Contact {
            birth,
            city: city.to_string(),
            state: state.to_string(),
            area,
            number: number.to_string(),
            phone_type,
        });
    }

    /// Fail the next statement of `kind` with `error`. A connection-loss
    /// error also breaks the connection it happens on.
    pub fn fail_next(&self, kind: StatementKind, error: Error) {
        self.state.lock().faults.push((kind, error));
    }

    /// Refuse the next `n` connection attempts
    pub fn refuse_connects(&self, n: usize) {
        self.state.lock().refuse_connects = n;
    }

    /// Successful connects so far
    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    /// Connections closed so far
    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    /// Every statement attempted, in order
    pub fn statements(&self) -> Vec<(StatementKind, String)> {
        self.state.lock().statements.clone()
    }

    /// Number of attempted statements of `kind`
    pub fn count(&self, kind: StatementKind) -> usize {
        self.state
            .lock()
            .statements
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Session policy statements, across all connections
    pub fn policy_statements(&self) -> Vec<String> {
        self.state
            .lock()
            .statements
            .iter()
            .filter(|(k, _)| *k == StatementKind::Policy)
            .map(|(_, sql)| sql.clone())
            .collect()
    }
}

#[async_trait]
impl ConnectionFactory for MockStore {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let mut state = self.state.lock();
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(Error::connection("connection refused"));
        }
        state.connects += 1;
        Ok(Box::new(MockConnection {
            store: self.state.clone(),
            scratch: Mutex::new(None),
            broken: AtomicBool::new(false),
        }))
    }
}

/// One mock session with its own scratch table
pub struct MockConnection {
    store: Arc<Mutex<StoreState>>,
    scratch: Mutex<Option<Vec<StagedKey>>>,
    broken: AtomicBool,
}

impl MockConnection {
    /// Log the statement and fire any pending fault for it
    fn begin(&self, sql: &str) -> Result<StatementKind> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(Error::connection("connection is closed"));
        }

        let kind = StatementKind::of(sql);
        let mut store = self.store.lock();
        store.statements.push((kind, sql.to_string()));

        if let Some(pos) = store.faults.iter().position(|(k, _)| *k == kind) {
            let (_, err) = store.faults.remove(pos);
            if err.is_connection_loss() {
                self.broken.store(true, Ordering::SeqCst);
            }
            return Err(err);
        }
        Ok(kind)
    }

    fn stage(&self, params: &[Value]) -> Result<u64> {
        let mut scratch = self.scratch.lock();
        let table = scratch
            .as_mut()
            .ok_or_else(|| Error::query_with_code("Invalid object name", 208))?;

        if params.len() % 3 != 0 {
            return Err(Error::query("parameter count is not a multiple of 3"));
        }
        for triple in params.chunks(3) {
            let (Value::Date(birth_date), Value::String(city), Value::String(state)) =
                (&triple[0], &triple[1], &triple[2])
            else {
                return Err(Error::type_conversion("unexpected parameter types"));
            };
            table.push(StagedKey {
                birth_date: *birth_date,
                city: city.clone(),
                state: state.clone(),
            });
        }
        Ok((params.len() / 3) as u64)
    }

    fn lookup(&self, params: &[Value]) -> Result<Vec<Row>> {
        let scratch = self.scratch.lock();
        let staged = scratch
            .as_ref()
            .ok_or_else(|| Error::query_with_code("Invalid object name", 208))?;
        let phone_type = params
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::query("missing phone type parameter"))?;

        let store = self.store.lock();
        let mut seen = Vec::new();
        for key in staged {
            let from = key.birth_date.and_time(chrono::NaiveTime::MIN);
            let until = from + ChronoDuration::days(1);
            for c in &store.contacts {
                let matches = c.birth >= from
                    && c.birth < until
                    && c.city.eq_ignore_ascii_case(&key.city)
                    && c.state.eq_ignore_ascii_case(&key.state)
                    && i64::from(c.phone_type) == phone_type;
                let pair = (c.area, c.number.clone());
                if matches && !seen.contains(&pair) {
                    seen.push(pair);
                }
            }
        }

        Ok(seen
            .into_iter()
            .map(|(area, number)| {
                Row::new(
                    vec!["DDD".into(), "TELEFONE".into()],
                    vec![Value::Int16(area), Value::String(number)],
                )
            })
            .collect())
    }

    fn apply(&self, kind: StatementKind, params: &[Value]) -> Result<u64> {
        match kind {
            StatementKind::DropScratch => {
                *self.scratch.lock() = None;
                Ok(0)
            }
            StatementKind::CreateScratch => {
                let mut scratch = self.scratch.lock();
                if scratch.is_some() {
                    return Err(Error::query_with_code(
                        "There is already an object with that name in the database",
                        2714,
                    ));
                }
                *scratch = Some(Vec::new());
                Ok(0)
            }
            StatementKind::Insert => self.stage(params),
            _ => Ok(0),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        match self.begin(sql)? {
            StatementKind::Lookup => self.lookup(params),
            kind => self.apply(kind, params).map(|_| Vec::new()),
        }
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let kind = self.begin(sql)?;
        self.apply(kind, params)
    }

    async fn close(&self) -> Result<()> {
        self.broken.store(true, Ordering::SeqCst);
        self.store.lock().closes += 1;
        Ok(())
    }
}
