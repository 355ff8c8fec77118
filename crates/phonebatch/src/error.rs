//! Error types for phonebatch
//!
//! Two layers:
//! - [`RowError`]: one malformed input row. Logged and skipped; never stops
//!   the chunk it belongs to.
//! - [`Error`]: pipeline failures (input, output, store, session acquisition,
//!   configuration).

use thiserror::Error;

/// Result type alias for the phonebatch pipeline
pub type Result<T> = std::result::Result<T, Error>;

/// A single input row that cannot become an
/// [`InputRecord`](crate::source::InputRecord)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    /// Required column absent from the row
    #[error("line {line}: missing value for column '{column}'")]
    MissingField { line: u64, column: String },

    /// Birth date is not a valid `YYYY-MM-DD` calendar date
    #[error("line {line}: invalid birth date '{value}'")]
    InvalidDate { line: u64, value: String },

    /// City is blank
    #[error("line {line}: empty city")]
    EmptyCity { line: u64 },

    /// City does not fit the scratch table column
    #[error("line {line}: city '{value}' exceeds {max} characters")]
    CityTooLong { line: u64, value: String, max: usize },

    /// State is not a two-letter code
    #[error("line {line}: invalid state code '{value}'")]
    InvalidState { line: u64, value: String },

    /// The row could not be decoded at all
    #[error("line {line}: unreadable row: {message}")]
    Malformed { line: u64, message: String },
}

impl RowError {
    /// Input line the error refers to (1-based, header is line 1)
    pub fn line(&self) -> u64 {
        match self {
            Self::MissingField { line, .. }
            | Self::InvalidDate { line, .. }
            | Self::EmptyCity { line }
            | Self::CityTooLong { line, .. }
            | Self::InvalidState { line, .. }
            | Self::Malformed { line, .. } => *line,
        }
    }
}

/// Main error type for the phonebatch pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Input file cannot be used (missing header, unreadable file)
    #[error("input error: {0}")]
    Input(String),

    /// CSV decoding error outside a single row
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Output IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error that escaped retry handling
    #[error(transparent)]
    Store(#[from] phonebatch_rdbc::Error),

    /// A new session could not be opened or prepared
    #[error("could not open database session: {0}")]
    SessionAcquisition(#[source] phonebatch_rdbc::Error),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error came from opening a session
    pub fn is_session_acquisition(&self) -> bool {
        matches!(self, Self::SessionAcquisition(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_error_line() {
        let err = RowError::InvalidDate {
            line: 7,
            value: "1990-13-01".into(),
        };
        assert_eq!(err.line(), 7);
        assert!(err.to_string().contains("1990-13-01"));
        assert!(err.to_string().starts_with("line 7"));
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: Error = phonebatch_rdbc::Error::deadlock("victim").into();
        assert!(err.to_string().contains("deadlock"));
        assert!(!err.is_session_acquisition());
    }

    #[test]
    fn test_session_acquisition_display() {
        let err = Error::SessionAcquisition(phonebatch_rdbc::Error::connection("refused"));
        assert!(err.is_session_acquisition());
        assert!(err.to_string().contains("could not open database session"));
        assert!(err.to_string().contains("refused"));
    }
}
