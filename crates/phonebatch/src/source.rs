//! Chunked input reader
//!
//! [`RecordSource`] streams a delimited file as fixed-size chunks. Rows are
//! only split into fields here; turning a row into an [`InputRecord`] (and
//! rejecting it) happens per row in the orchestrator so one bad line never
//! costs the rest of its chunk.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;

use crate::error::{Error, Result, RowError};

/// Widest city the scratch table column accepts
pub const MAX_CITY_LEN: usize = 40;

/// Birth date format expected in the input
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Column layout of the input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFormat {
    /// Field delimiter byte
    pub delimiter: u8,
    /// Header of the birth date column
    pub birth_date_column: String,
    /// Header of the city column
    pub city_column: String,
    /// Header of the state column
    pub state_column: String,
}

impl Default for InputFormat {
    fn default() -> Self {
        Self {
            delimiter: b',',
            birth_date_column: "data_nasc".into(),
            city_column: "cidade".into(),
            state_column: "uf".into(),
        }
    }
}

/// One input row, split but not validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// Line in the input file (header is line 1)
    pub line: u64,
    pub birth_date: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// A row as read: either split fields or the reason it could not be read
pub type SourceRow = std::result::Result<RawRow, RowError>;

/// A bounded batch of rows
pub type Chunk = Vec<SourceRow>;

/// A validated lookup key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    pub birth_date: NaiveDate,
    pub city: String,
    /// Two-letter code, upper case
    pub state: String,
}

impl InputRecord {
    /// Validate a raw row.
    ///
    /// City and state are trimmed; state is upper-cased so it compares the
    /// same way regardless of how the file spelled it. Missing values are
    /// reported under the header names in `format`.
    pub fn parse(row: &RawRow, format: &InputFormat) -> std::result::Result<Self, RowError> {
        let line = row.line;
        let birth = required(row.birth_date.as_deref(), line, &format.birth_date_column)?;
        let birth_date =
            NaiveDate::parse_from_str(birth, DATE_FORMAT).map_err(|_| RowError::InvalidDate {
                line,
                value: birth.to_string(),
            })?;

        let city = row.city.as_deref().map(str::trim).unwrap_or_default();
        if city.is_empty() {
            return Err(RowError::EmptyCity { line });
        }
        if city.chars().count() > MAX_CITY_LEN {
            return Err(RowError::CityTooLong {
                line,
                value: city.to_string(),
                max: MAX_CITY_LEN,
            });
        }

        let state = required(row.state.as_deref(), line, &format.state_column)?;
        if state.len() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RowError::InvalidState {
                line,
                value: state.to_string(),
            });
        }

        Ok(Self {
            birth_date,
            city: city.to_string(),
            state: state.to_ascii_uppercase(),
        })
    }
}

fn required<'a>(
    value: Option<&'a str>,
    line: u64,
    column: &str,
) -> std::result::Result<&'a str, RowError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RowError::MissingField {
            line,
            column: column.to_string(),
        }),
    }
}

/// Lazy chunked reader over a delimited file
pub struct RecordSource<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    birth_idx: usize,
    city_idx: usize,
    state_idx: usize,
    batch_size: usize,
    finished: bool,
}

impl RecordSource<File> {
    /// Open a file and resolve its header
    pub fn open(path: impl AsRef<Path>, format: &InputFormat, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Input(format!("cannot open {}: {}", path.display(), e)))?;
        Self::from_reader(file, format, batch_size)
    }
}

impl<R: Read> RecordSource<R> {
    /// Wrap any reader. The header row is read immediately.
    pub fn from_reader(reader: R, format: &InputFormat, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".into()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(format.delimiter)
            .flexible(true)
            .has_headers(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
                .ok_or_else(|| Error::Input(format!("input has no '{}' column", name)))
        };

        Ok(Self {
            birth_idx: find(&format.birth_date_column)?,
            city_idx: find(&format.city_column)?,
            state_idx: find(&format.state_column)?,
            records: reader.into_records(),
            batch_size,
            finished: false,
        })
    }

    /// Maximum rows per chunk
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn next_row(&mut self) -> Option<SourceRow> {
        let result = self.records.next()?;
        Some(match result {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                let field = |idx: usize| record.get(idx).map(str::to_string);
                Ok(RawRow {
                    line,
                    birth_date: field(self.birth_idx),
                    city: field(self.city_idx),
                    state: field(self.state_idx),
                })
            }
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or_default();
                // the underlying reader is gone; nothing more will come
                if matches!(err.kind(), csv::ErrorKind::Io(_)) {
                    self.finished = true;
                }
                Err(RowError::Malformed {
                    line,
                    message: err.to_string(),
                })
            }
        })
    }
}

impl<R: Read> Iterator for RecordSource<R> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.finished {
            return None;
        }

        let mut chunk = Vec::with_capacity(self.batch_size);
        while chunk.len() < self.batch_size && !self.finished {
            match self.next_row() {
                Some(row) => chunk.push(row),
                None => self.finished = true,
            }
        }

        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(data: &str, batch: usize) -> RecordSource<&[u8]> {
        RecordSource::from_reader(data.as_bytes(), &InputFormat::default(), batch).unwrap()
    }

    fn parse(row: &RawRow) -> std::result::Result<InputRecord, RowError> {
        InputRecord::parse(row, &InputFormat::default())
    }

    fn raw(birth: &str, city: &str, state: &str) -> RawRow {
        RawRow {
            line: 2,
            birth_date: Some(birth.into()),
            city: Some(city.into()),
            state: Some(state.into()),
        }
    }

    #[test]
    fn test_chunks_are_bounded() {
        let data = "data_nasc,cidade,uf\n\
                    1990-01-01,Recife,PE\n\
                    1991-02-02,Natal,RN\n\
                    1992-03-03,Belem,PA\n";
        let chunks: Vec<Chunk> = source(data, 2).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 2);
        assert_eq!(chunks[1].len(), 1);

        let first = chunks[0][0].as_ref().unwrap();
        assert_eq!(first.line, 2);
        assert_eq!(first.city.as_deref(), Some("Recife"));
    }

    #[test]
    fn test_header_match_ignores_case_and_order() {
        let data = " UF ;Cidade;DATA_NASC\nsp;Santos;1980-05-06\n";
        let format = InputFormat {
            delimiter: b';',
            ..Default::default()
        };
        let mut src = RecordSource::from_reader(data.as_bytes(), &format, 10).unwrap();
        let chunk = src.next().unwrap();
        let row = chunk[0].as_ref().unwrap();
        assert_eq!(row.birth_date.as_deref(), Some("1980-05-06"));
        assert_eq!(row.state.as_deref(), Some("sp"));
    }

    #[test]
    fn test_missing_column_is_input_error() {
        let err = RecordSource::from_reader(
            "data_nasc,cidade\n".as_bytes(),
            &InputFormat::default(),
            10,
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Input(ref m) if m.contains("uf")));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = RecordSource::from_reader(
            "data_nasc,cidade,uf\n".as_bytes(),
            &InputFormat::default(),
            0,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_short_row_yields_missing_field() {
        let data = "data_nasc,cidade,uf\n1990-01-01,Recife\n";
        let chunk = source(data, 10).next().unwrap();
        let row = chunk[0].as_ref().unwrap();
        assert_eq!(row.state, None);
        assert!(matches!(
            parse(row),
            Err(RowError::MissingField { line: 2, ref column }) if column == "uf"
        ));
    }

    #[test]
    fn test_missing_field_names_configured_header() {
        let format = InputFormat {
            birth_date_column: "nascimento".into(),
            state_column: "estado".into(),
            ..Default::default()
        };
        let mut row = raw("1990-01-01", "Recife", "PE");
        row.birth_date = Some("  ".into());

        let err = InputRecord::parse(&row, &format).unwrap_err();
        assert!(matches!(err, RowError::MissingField { ref column, .. } if column == "nascimento"));
        assert!(err.to_string().contains("'nascimento'"));

        let mut row = raw("1990-01-01", "Recife", "PE");
        row.state = None;
        assert!(matches!(
            InputRecord::parse(&row, &format),
            Err(RowError::MissingField { ref column, .. }) if column == "estado"
        ));
    }

    #[test]
    fn test_empty_input_has_no_chunks() {
        assert!(source("data_nasc,cidade,uf\n", 10).next().is_none());
    }

    #[test]
    fn test_parse_valid_record() {
        let record = parse(&raw(" 1985-12-31 ", " Porto Alegre ", "rs")).unwrap();
        assert_eq!(record.birth_date, NaiveDate::from_ymd_opt(1985, 12, 31).unwrap());
        assert_eq!(record.city, "Porto Alegre");
        assert_eq!(record.state, "RS");
    }

    #[test]
    fn test_parse_rejects_bad_dates() {
        for bad in ["1990-02-30", "31/12/1990", "1990-13-01", "yesterday"] {
            assert!(
                matches!(
                    parse(&raw(bad, "Recife", "PE")),
                    Err(RowError::InvalidDate { .. })
                ),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn test_parse_rejects_bad_city_and_state() {
        assert!(matches!(
            parse(&raw("1990-01-01", "  ", "PE")),
            Err(RowError::EmptyCity { .. })
        ));
        assert!(matches!(
            parse(&raw("1990-01-01", &"x".repeat(41), "PE")),
            Err(RowError::CityTooLong { max: 40, .. })
        ));
        assert!(parse(&raw("1990-01-01", &"x".repeat(40), "PE")).is_ok());
        assert!(matches!(
            parse(&raw("1990-01-01", "Recife", "PER")),
            Err(RowError::InvalidState { .. })
        ));
        assert!(matches!(
            parse(&raw("1990-01-01", "Recife", "P1")),
            Err(RowError::InvalidState { .. })
        ));
    }
}
