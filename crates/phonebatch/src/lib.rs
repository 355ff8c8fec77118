//! # phonebatch
//!
//! Bulk phone-number lookup against SQL Server.
//!
//! Input rows (birth date, city, state) are read in fixed-size chunks. Each
//! chunk is staged into a session-scoped temporary table and resolved with a
//! single join, so the database sees one round of statements per chunk
//! rather than one query per person.
//!
//! ## Pipeline
//!
//! ```text
//! RecordSource -> Orchestrator -> BatchResolver -> ResultSink
//!                      |               |
//!                SessionManager   RetryExecutor
//! ```
//!
//! - [`RecordSource`](source::RecordSource): lazy chunked CSV reader
//! - [`SessionManager`](session::SessionManager): the run's one session,
//!   session policy, reconnect
//! - [`RetryExecutor`](retry::RetryExecutor): classification-based retry with
//!   exponential backoff
//! - [`BatchResolver`](resolver::BatchResolver): stage, query, clean up; replay
//!   on connection loss
//! - [`ResultSink`](sink::ResultSink): append-only output, one number per line
//! - [`Orchestrator`](orchestrator::Orchestrator): the chunk loop, throttling
//!   and per-chunk throughput logging
//!
//! ## Example
//!
//! ```rust,ignore
//! use phonebatch::prelude::*;
//! use phonebatch_rdbc::sqlserver::SqlServerConnectionFactory;
//!
//! let config = RunConfig::default();
//! let source = RecordSource::open("PE_people.csv", &config.input, config.batch_size)?;
//! let sink = ResultSink::create("output/PE_phones.csv")?;
//!
//! let mut orchestrator =
//!     Orchestrator::new(&config, Arc::new(SqlServerConnectionFactory::new()), sink)?;
//! let summary = orchestrator.run(source).await?;
//! summary.log();
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod resolver;
pub mod retry;
pub mod session;
pub mod sink;
pub mod source;
pub mod testing;
pub mod throttle;

pub use cli::Cli;
pub use config::RunConfig;
pub use error::{Error, Result, RowError};
pub use orchestrator::{Orchestrator, RunSummary};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::RunConfig;
    pub use crate::error::{Error, Result, RowError};
    pub use crate::orchestrator::{Orchestrator, RunSummary};
    pub use crate::resolver::{BatchResolver, LookupConfig, PhoneResult};
    pub use crate::retry::{Classification, RetryExecutor, RetryPolicy};
    pub use crate::session::{Session, SessionManager, SessionPolicy};
    pub use crate::sink::ResultSink;
    pub use crate::source::{Chunk, InputFormat, InputRecord, RecordSource};
    pub use crate::throttle::Throttle;
}
