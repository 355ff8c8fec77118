//! Append-only result file
//!
//! One phone number per line, no header. Each chunk's results are flushed
//! before the next chunk starts, so an interrupted run keeps everything that
//! finished.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::debug;

use crate::error::Result;
use crate::resolver::PhoneResult;

/// Writes resolved numbers to an output stream
pub struct ResultSink<W: Write> {
    writer: BufWriter<W>,
    path: Option<PathBuf>,
    written: u64,
}

impl ResultSink<File> {
    /// Open `path` for appending, creating parent directories as needed
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!("Writing results to {}", path.display());
        Ok(Self {
            writer: BufWriter::new(file),
            path: Some(path.to_path_buf()),
            written: 0,
        })
    }
}

impl<W: Write> ResultSink<W> {
    /// Wrap an arbitrary writer
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            path: None,
            written: 0,
        }
    }

    /// Append one chunk's results and flush. Empty input is a no-op.
    pub fn write(&mut self, phones: &[PhoneResult]) -> Result<usize> {
        if phones.is_empty() {
            return Ok(0);
        }
        for phone in phones {
            writeln!(self.writer, "{}", phone)?;
        }
        self.writer.flush()?;
        self.written += phones.len() as u64;
        Ok(phones.len())
    }

    /// Lines written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// File path, when the sink was opened with [`create`](ResultSink::create)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error().into())
    }
}

/// Output file for `input`: `<dir>/<prefix>_phones_<YYYYmmdd_HHMMSS>.csv`,
/// where `prefix` is the first two characters of the input file name.
pub fn derive_output_path(input: &Path, dir: &Path, now: NaiveDateTime) -> PathBuf {
    let stem = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix: String = stem.chars().take(2).collect();
    let prefix = if prefix.is_empty() { "xx".to_string() } else { prefix };
    dir.join(format!(
        "{}_phones_{}.csv",
        prefix,
        now.format("%Y%m%d_%H%M%S")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn phones(values: &[&str]) -> Vec<PhoneResult> {
        values.iter().map(|v| PhoneResult::new(*v)).collect()
    }

    #[test]
    fn test_writes_one_per_line() {
        let mut sink = ResultSink::from_writer(Vec::new());
        assert_eq!(sink.write(&phones(&["5581999990000", "5584988887777"])).unwrap(), 2);
        assert_eq!(sink.write(&[]).unwrap(), 0);
        assert_eq!(sink.written(), 2);

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(out, "5581999990000\n5584988887777\n");
    }

    #[test]
    fn test_create_appends_and_makes_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/pe_phones.csv");

        let mut sink = ResultSink::create(&path).unwrap();
        sink.write(&phones(&["5581911112222"])).unwrap();
        assert_eq!(sink.path(), Some(path.as_path()));
        drop(sink);

        let mut sink = ResultSink::create(&path).unwrap();
        sink.write(&phones(&["5581933334444"])).unwrap();
        drop(sink);

        let out = std::fs::read_to_string(&path).unwrap();
        assert_eq!(out, "5581911112222\n5581933334444\n");
    }

    #[test]
    fn test_derive_output_path() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 1)
            .unwrap();
        let path = derive_output_path(Path::new("/data/PE_recife.csv"), Path::new("output"), now);
        assert_eq!(path, PathBuf::from("output/PE_phones_20240309_070501.csv"));

        let path = derive_output_path(Path::new("x"), Path::new("out"), now);
        assert_eq!(path, PathBuf::from("out/x_phones_20240309_070501.csv"));
    }
}
