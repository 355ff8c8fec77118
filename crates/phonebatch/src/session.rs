//! Database session lifecycle
//!
//! The run owns exactly one [`Session`] at a time. [`SessionManager`] opens
//! it, applies the session policy before anyone else sees it, and replaces it
//! wholesale on reconnect: a new `Session` value, never a patched one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use phonebatch_rdbc::connection::{Connection, ConnectionConfig, ConnectionFactory, IsolationLevel};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Session-scoped settings applied after every (re)connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Transaction isolation level
    pub isolation: IsolationLevel,
    /// `QUERY_GOVERNOR_COST_LIMIT`; zero lifts the cap
    pub query_cost_limit: u32,
    /// How long a statement waits on a lock before failing with 1222
    pub lock_timeout: Duration,
    /// When false, the session runs with implicit transactions
    pub autocommit: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::ReadCommitted,
            query_cost_limit: 20,
            lock_timeout: Duration::from_millis(5000),
            autocommit: true,
        }
    }
}

impl SessionPolicy {
    /// Statements to run, in order, on a fresh connection
    pub fn statements(&self) -> Vec<String> {
        vec![
            "SET NOCOUNT ON".to_string(),
            "SET DEADLOCK_PRIORITY LOW".to_string(),
            format!("SET TRANSACTION ISOLATION LEVEL {}", self.isolation.to_sql()),
            format!("SET QUERY_GOVERNOR_COST_LIMIT {}", self.query_cost_limit),
            format!("SET LOCK_TIMEOUT {}", self.lock_timeout.as_millis()),
            format!(
                "SET IMPLICIT_TRANSACTIONS {}",
                if self.autocommit { "OFF" } else { "ON" }
            ),
        ]
    }
}

/// A live, policy-configured connection
pub struct Session {
    conn: Box<dyn Connection>,
    id: u64,
    opened_at: Instant,
}

impl Session {
    /// The underlying connection
    pub fn connection(&self) -> &dyn Connection {
        self.conn.as_ref()
    }

    /// Sequence number of this session within the run (first is 1)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Time since the session was opened
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("age", &self.age())
            .finish()
    }
}

/// Opens, closes and replaces sessions
pub struct SessionManager {
    factory: Arc<dyn ConnectionFactory>,
    config: ConnectionConfig,
    policy: SessionPolicy,
    next_id: AtomicU64,
    reconnects: AtomicU64,
}

impl SessionManager {
    /// Create a manager. No connection is opened until [`acquire`](Self::acquire).
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        config: ConnectionConfig,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            factory,
            config,
            policy,
            next_id: AtomicU64::new(1),
            reconnects: AtomicU64::new(0),
        }
    }

    /// Session policy applied on every connect
    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Open a connection and apply the session policy.
    ///
    /// Not retried here; the caller decides what a failure means.
    pub async fn acquire(&self) -> Result<Session> {
        let conn = self
            .factory
            .connect(&self.config)
            .await
            .map_err(Error::SessionAcquisition)?;

        for statement in self.policy.statements() {
            if let Err(e) = conn.execute(&statement, &[]).await {
                if let Err(close_err) = conn.close().await {
                    debug!("Ignoring close error after failed setup: {}", close_err);
                }
                return Err(Error::SessionAcquisition(e));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(
            "Opened session {} to {}/{} (isolation {}, lock timeout {:?})",
            id,
            self.config.address(),
            self.config.database,
            self.policy.isolation,
            self.policy.lock_timeout
        );

        Ok(Session {
            conn,
            id,
            opened_at: Instant::now(),
        })
    }

    /// Close a session, swallowing close-time errors
    pub async fn release(&self, session: Session) {
        if let Err(e) = session.conn.close().await {
            debug!("Ignoring error closing session {}: {}", session.id, e);
        }
        debug!("Closed session {} after {:?}", session.id, session.age());
    }

    /// Drop the old session (if any) and open a new one
    pub async fn reconnect(&self, old: Option<Session>) -> Result<Session> {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        if let Some(old) = old {
            warn!("Reconnecting, replacing session {}", old.id);
            self.release(old).await;
        } else {
            warn!("Reconnecting, no previous session");
        }
        self.acquire().await
    }

    /// Reconnects attempted so far
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockStore, StatementKind};
    use phonebatch_rdbc::Error as StoreError;

    fn manager(store: &MockStore, policy: SessionPolicy) -> SessionManager {
        SessionManager::new(Arc::new(store.clone()), ConnectionConfig::default(), policy)
    }

    #[test]
    fn test_policy_statement_order() {
        let statements = SessionPolicy::default().statements();
        assert_eq!(
            statements,
            vec![
                "SET NOCOUNT ON",
                "SET DEADLOCK_PRIORITY LOW",
                "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
                "SET QUERY_GOVERNOR_COST_LIMIT 20",
                "SET LOCK_TIMEOUT 5000",
                "SET IMPLICIT_TRANSACTIONS OFF",
            ]
        );
    }

    #[test]
    fn test_policy_without_autocommit() {
        let policy = SessionPolicy {
            autocommit: false,
            ..Default::default()
        };
        assert_eq!(
            policy.statements().last().map(String::as_str),
            Some("SET IMPLICIT_TRANSACTIONS ON")
        );
    }

    #[tokio::test]
    async fn test_acquire_applies_policy() {
        let store = MockStore::new();
        let sessions = manager(&store, SessionPolicy::default());

        let session = sessions.acquire().await.unwrap();
        assert_eq!(session.id(), 1);
        assert_eq!(store.connects(), 1);
        assert_eq!(store.policy_statements(), SessionPolicy::default().statements());
    }

    #[tokio::test]
    async fn test_acquire_failure_is_session_error() {
        let store = MockStore::new();
        store.refuse_connects(1);
        let sessions = manager(&store, SessionPolicy::default());

        let err = sessions.acquire().await.unwrap_err();
        assert!(err.is_session_acquisition());
    }

    #[tokio::test]
    async fn test_policy_failure_closes_connection() {
        let store = MockStore::new();
        store.fail_next(StatementKind::Policy, StoreError::query("permission denied"));
        let sessions = manager(&store, SessionPolicy::default());

        assert!(sessions.acquire().await.is_err());
        assert_eq!(store.closes(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_session_and_reapplies_policy() {
        let store = MockStore::new();
        let sessions = manager(&store, SessionPolicy::default());

        let first = sessions.acquire().await.unwrap();
        let second = sessions.reconnect(Some(first)).await.unwrap();

        assert_eq!(second.id(), 2);
        assert_eq!(sessions.reconnects(), 1);
        assert_eq!(store.connects(), 2);
        assert_eq!(store.closes(), 1);
        assert_eq!(store.policy_statements().len(), 12);
    }
}
