//! Driver loop
//!
//! Pulls chunks from the source, validates rows, resolves each chunk on the
//! run's session and appends the results. Chunks run strictly one after
//! another; the only waits are the inter-chunk throttle and retry backoffs.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use phonebatch_rdbc::connection::ConnectionFactory;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::resolver::BatchResolver;
use crate::retry::RetryExecutor;
use crate::session::{Session, SessionManager};
use crate::sink::ResultSink;
use crate::source::{Chunk, InputFormat, InputRecord};
use crate::throttle::Throttle;

/// Totals for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Chunks read from the source
    pub chunks: u64,
    /// Rows read, valid or not
    pub rows_read: u64,
    /// Rows rejected during validation
    pub rows_rejected: u64,
    /// Valid records sent to the database
    pub records_queried: u64,
    /// Lines appended to the output
    pub phones_written: u64,
    /// Chunks abandoned after an unrecoverable error
    pub failed_chunks: u64,
    /// Backoff retries, statement and chunk level
    pub retries: u64,
    /// Session reconnects
    pub reconnects: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Rows per second over the whole run
    pub fn throughput(&self) -> f64 {
        self.rows_read as f64 / self.elapsed.as_secs_f64().max(0.001)
    }

    /// Log the completion summary
    pub fn log(&self) {
        info!(
            "Run complete: {} chunks, {} rows read, {} rejected, {} phones written, \
             {} failed chunks, {} retries, {} reconnects in {:.2}s ({:.1} rows/s)",
            self.chunks,
            self.rows_read,
            self.rows_rejected,
            self.phones_written,
            self.failed_chunks,
            self.retries,
            self.reconnects,
            self.elapsed.as_secs_f64(),
            self.throughput()
        );
    }
}

/// Runs the chunk loop against one database
pub struct Orchestrator<W: Write> {
    sessions: SessionManager,
    resolver: BatchResolver,
    retry: Arc<RetryExecutor>,
    throttle: Throttle,
    input: InputFormat,
    sink: ResultSink<W>,
}

impl<W: Write> Orchestrator<W> {
    /// Wire up the pipeline. Nothing connects until [`run`](Self::run).
    pub fn new(
        config: &RunConfig,
        factory: Arc<dyn ConnectionFactory>,
        sink: ResultSink<W>,
    ) -> Result<Self> {
        let retry = Arc::new(RetryExecutor::new(config.retry.clone()));
        let resolver = BatchResolver::new(
            config.lookup.clone(),
            config.session.autocommit,
            retry.clone(),
        )
        .map_err(|e| Error::Config(e.to_string()))?;
        let sessions =
            SessionManager::new(factory, config.connection.clone(), config.session.clone());

        Ok(Self {
            sessions,
            resolver,
            retry,
            throttle: config.throttle,
            input: config.input.clone(),
            sink,
        })
    }

    /// Process every chunk.
    ///
    /// Fails only if the first session cannot be opened or the output cannot
    /// be written. A chunk that cannot be resolved is logged, counted in
    /// [`RunSummary::failed_chunks`] and the run moves on.
    pub async fn run(&mut self, chunks: impl IntoIterator<Item = Chunk>) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        let mut slot: Option<Session> = Some(self.sessions.acquire().await?);
        let outcome = self.process(chunks, &mut slot, &mut summary).await;
        if let Some(session) = slot.take() {
            self.sessions.release(session).await;
        }
        outcome?;

        summary.retries = self.retry.retries();
        summary.reconnects = self.sessions.reconnects();
        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    async fn process(
        &mut self,
        chunks: impl IntoIterator<Item = Chunk>,
        slot: &mut Option<Session>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let mut queried_any = false;

        for (index, chunk) in chunks.into_iter().enumerate() {
            let number = index + 1;
            let chunk_started = Instant::now();
            summary.chunks += 1;
            summary.rows_read += chunk.len() as u64;

            let records = validate(chunk, &self.input, summary);
            if records.is_empty() {
                warn!("Chunk {}: no valid rows, skipping", number);
                continue;
            }

            if queried_any {
                self.throttle.pause().await;
            }
            queried_any = true;
            summary.records_queried += records.len() as u64;

            let outcome = self
                .resolver
                .resolve_with_reconnect(&self.sessions, slot, &records)
                .await;
            let written = match outcome {
                Ok(phones) => Some(self.sink.write(&phones)?),
                Err(e) => {
                    error!("Chunk {}: giving up on {} records: {}", number, records.len(), e);
                    summary.failed_chunks += 1;
                    None
                }
            };

            let secs = chunk_started.elapsed().as_secs_f64();
            let rate = records.len() as f64 / secs.max(0.001);
            match written {
                Some(written) => {
                    summary.phones_written += written as u64;
                    info!(
                        "Chunk {}: {} records, {} phones in {:.2}s ({:.1} rows/s)",
                        number,
                        records.len(),
                        written,
                        secs,
                        rate
                    );
                }
                None => warn!(
                    "Chunk {}: {} records failed after {:.2}s ({:.1} rows/s)",
                    number,
                    records.len(),
                    secs,
                    rate
                ),
            }
        }
        Ok(())
    }

    /// Output sink, e.g. to inspect an in-memory writer after a run
    pub fn into_sink(self) -> ResultSink<W> {
        self.sink
    }
}

fn validate(chunk: Chunk, format: &InputFormat, summary: &mut RunSummary) -> Vec<InputRecord> {
    let mut records = Vec::with_capacity(chunk.len());
    for row in chunk {
        match row.and_then(|raw| InputRecord::parse(&raw, format)) {
            Ok(record) => records.push(record),
            Err(e) => {
                error!("Skipping row: {}", e);
                summary.rows_rejected += 1;
            }
        }
    }
    records
}
