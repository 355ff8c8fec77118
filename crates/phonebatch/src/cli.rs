//! CLI argument parsing for phonebatch
//!
//! Every option can also come from the environment (and therefore from a
//! `.env` file loaded at startup). Durations are given in seconds as decimals
//! to match the usual deployment files.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDateTime;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use phonebatch_rdbc::connection::{ConnectionConfig, Encryption};
use phonebatch_rdbc::security::temp_table_name;

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::resolver::LookupConfig;
use crate::retry::RetryPolicy;
use crate::session::SessionPolicy;
use crate::sink::derive_output_path;
use crate::source::InputFormat;
use crate::throttle::Throttle;

/// phonebatch - bulk phone number lookup
///
/// Reads people (birth date, city, state) from a delimited file, resolves
/// their mobile numbers against SQL Server in chunks and appends the numbers
/// to an output file, one per line.
#[derive(Parser, Debug)]
#[command(name = "phonebatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    // ============ Input / Output ============
    /// Input file with birth date, city and state columns
    pub input: PathBuf,

    /// Output file (default: <output-dir>/<prefix>_phones_<timestamp>.csv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for generated output file names
    #[arg(long, default_value = "output", env = "OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Field delimiter of the input file (single character, or "tab")
    #[arg(long, default_value = ",", env = "INPUT_DELIMITER")]
    pub input_delimiter: String,

    /// Header of the birth date column
    #[arg(long, default_value = "data_nasc", env = "INPUT_DATE_COLUMN")]
    pub date_column: String,

    /// Header of the city column
    #[arg(long, default_value = "cidade", env = "INPUT_CITY_COLUMN")]
    pub city_column: String,

    /// Header of the state column
    #[arg(long, default_value = "uf", env = "INPUT_STATE_COLUMN")]
    pub state_column: String,

    // ============ Database ============
    /// Database server host
    #[arg(long, env = "DB_HOST")]
    pub db_host: String,

    /// Database server port
    #[arg(long, default_value = "1433", env = "DB_PORT")]
    pub db_port: u16,

    /// Database name
    #[arg(long, env = "DB_NAME")]
    pub db_name: String,

    /// SQL login
    #[arg(long, default_value = "", env = "DB_USER")]
    pub db_user: String,

    /// SQL login password
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Transport encryption (yes, no, strict, not_supported)
    #[arg(long, default_value = "yes", env = "ENCRYPT")]
    pub encrypt: String,

    /// Accept the server certificate without validation
    #[arg(
        long,
        default_value = "false",
        env = "TRUST_SERVER_CERTIFICATE",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub trust_server_certificate: bool,

    /// Application name reported to the server
    #[arg(long, default_value = "phonebatch", env = "APP_NAME")]
    pub app_name: String,

    /// Login timeout in seconds
    #[arg(long, default_value = "5", env = "SQL_LOGIN_TIMEOUT")]
    pub login_timeout: f64,

    /// Per-statement timeout in seconds (0 disables it)
    #[arg(long, default_value = "60", env = "SQL_QUERY_TIMEOUT")]
    pub query_timeout: f64,

    // ============ Session Policy ============
    /// Run each statement in its own transaction
    #[arg(
        long,
        default_value = "true",
        env = "SQL_AUTOCOMMIT",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub autocommit: bool,

    /// Lock wait limit in milliseconds
    #[arg(long, default_value = "5000", env = "SQL_LOCK_TIMEOUT_MS")]
    pub lock_timeout_ms: u64,

    /// Query governor cost limit (0 lifts the cap)
    #[arg(long, default_value = "20", env = "SQL_QUERY_COST_LIMIT")]
    pub query_cost_limit: u32,

    // ============ Batching & Retry ============
    /// Rows per chunk
    #[arg(long, default_value = "500", env = "SQL_BATCH_SIZE")]
    pub batch_size: usize,

    /// Retries after the first attempt for transient errors
    #[arg(long, default_value = "5", env = "SQL_MAX_RETRIES")]
    pub max_retries: u32,

    /// First retry delay in seconds; doubles on each retry
    #[arg(long, default_value = "0.2", env = "SQL_BACKOFF_INITIAL")]
    pub backoff_initial: f64,

    /// Pause between chunks in seconds
    #[arg(long, default_value = "0.2", env = "SQL_THROTTLE_BETWEEN_CHUNKS")]
    pub throttle: f64,

    /// Random extra pause between chunks, up to this many seconds
    #[arg(long, default_value = "0.1", env = "SQL_THROTTLE_JITTER")]
    pub throttle_jitter: f64,

    // ============ Lookup ============
    /// Scratch table name (without '#')
    #[arg(long, default_value = "phone_lookup", env = "SQL_SCRATCH_TABLE")]
    pub scratch_table: String,

    /// Phone type code of mobile numbers
    #[arg(long, default_value = "3", env = "PHONE_TYPE_CODE")]
    pub phone_type_code: i32,

    /// Country code prefixed to every number
    #[arg(long, default_value = "55", env = "PHONE_COUNTRY_CODE")]
    pub country_code: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.db_host.trim().is_empty() {
            return Err("db_host (--db-host / DB_HOST) must not be empty".to_string());
        }
        if self.db_name.trim().is_empty() {
            return Err("db_name (--db-name / DB_NAME) must not be empty".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }

        for (name, value) in [
            ("login_timeout", self.login_timeout),
            ("query_timeout", self.query_timeout),
            ("backoff_initial", self.backoff_initial),
            ("throttle", self.throttle),
            ("throttle_jitter", self.throttle_jitter),
        ] {
            seconds(name, value)?;
        }
        if self.login_timeout == 0.0 {
            return Err("login_timeout must be greater than 0".to_string());
        }

        self.encrypt
            .parse::<Encryption>()
            .map_err(|e| e.to_string())?;
        temp_table_name(&self.scratch_table).map_err(|e| e.to_string())?;
        delimiter(&self.input_delimiter)?;

        if self.country_code.is_empty() || !self.country_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(format!(
                "country_code '{}' must be digits only",
                self.country_code
            ));
        }

        Ok(())
    }

    /// Build the run configuration
    pub fn to_run_config(&self) -> Result<RunConfig> {
        self.validate().map_err(Error::Config)?;
        let encryption = self
            .encrypt
            .parse::<Encryption>()
            .map_err(|e| Error::Config(e.to_string()))?;

        let mut connection = ConnectionConfig::new(self.db_host.trim(), self.db_name.trim())
            .with_port(self.db_port)
            .with_credentials(
                self.db_user.clone(),
                self.db_password.clone().unwrap_or_default(),
            )
            .with_encryption(encryption)
            .with_trust_server_certificate(self.trust_server_certificate)
            .with_connect_timeout(Duration::from_secs_f64(self.login_timeout))
            .with_query_timeout(Duration::from_secs_f64(self.query_timeout));
        if !self.app_name.is_empty() {
            connection = connection.with_application_name(self.app_name.clone());
        }

        Ok(RunConfig {
            connection,
            session: SessionPolicy {
                query_cost_limit: self.query_cost_limit,
                lock_timeout: Duration::from_millis(self.lock_timeout_ms),
                autocommit: self.autocommit,
                ..Default::default()
            },
            lookup: LookupConfig {
                scratch_table: self.scratch_table.clone(),
                phone_type_code: self.phone_type_code,
                country_code: self.country_code.clone(),
            },
            retry: RetryPolicy::new(
                self.max_retries,
                Duration::from_secs_f64(self.backoff_initial),
            ),
            throttle: Throttle::new(
                Duration::from_secs_f64(self.throttle),
                Duration::from_secs_f64(self.throttle_jitter),
            ),
            batch_size: self.batch_size,
            input: InputFormat {
                delimiter: delimiter(&self.input_delimiter).map_err(Error::Config)?,
                birth_date_column: self.date_column.clone(),
                city_column: self.city_column.clone(),
                state_column: self.state_column.clone(),
            },
        })
    }

    /// Where results go for a run started at `now`
    pub fn output_path(&self, now: NaiveDateTime) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| derive_output_path(&self.input, &self.output_dir, now))
    }
}

fn seconds(name: &str, value: f64) -> std::result::Result<(), String> {
    // Duration::from_secs_f64 panics on these
    if !value.is_finite() || value < 0.0 || value > 86_400.0 {
        return Err(format!(
            "{} must be between 0 and 86400 seconds, got {}",
            name, value
        ));
    }
    Ok(())
}

fn delimiter(value: &str) -> std::result::Result<u8, String> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        v if v.len() == 1 && v.is_ascii() => Ok(v.as_bytes()[0]),
        v => Err(format!(
            "input delimiter must be a single ASCII character, got '{}'",
            v
        )),
    }
}
