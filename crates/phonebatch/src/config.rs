//! Run configuration
//!
//! Built once at startup (see [`Cli::to_run_config`](crate::cli::Cli::to_run_config))
//! and read-only for the rest of the run.

use phonebatch_rdbc::connection::ConnectionConfig;

use crate::resolver::LookupConfig;
use crate::retry::RetryPolicy;
use crate::session::SessionPolicy;
use crate::source::InputFormat;
use crate::throttle::Throttle;

/// Default rows per chunk
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Everything a run needs besides its input and output
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub connection: ConnectionConfig,
    pub session: SessionPolicy,
    pub lookup: LookupConfig,
    pub retry: RetryPolicy,
    pub throttle: Throttle,
    pub batch_size: usize,
    pub input: InputFormat,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            session: SessionPolicy::default(),
            lookup: LookupConfig::default(),
            retry: RetryPolicy::default(),
            throttle: Throttle::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            input: InputFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.backoff_initial, Duration::from_millis(200));
        assert_eq!(config.throttle.base(), Duration::from_millis(200));
        assert_eq!(config.throttle.jitter(), Duration::from_millis(100));
        assert!(config.session.autocommit);
        assert_eq!(config.lookup.phone_type_code, 3);
        assert_eq!(config.lookup.country_code, "55");
    }
}
