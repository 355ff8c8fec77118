//! Value types for phonebatch-rdbc
//!
//! A small SQL value model covering what the lookup workload binds and reads:
//! - Integers of the widths SQL Server returns for code columns
//! - Text (VARCHAR, CHAR)
//! - Dates (DATE)

use chrono::NaiveDate;

/// SQL value type that can hold any database value used by phonebatch
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value (BIT)
    Bool(bool),
    /// 16-bit signed integer (SMALLINT, TINYINT)
    Int16(i16),
    /// 32-bit signed integer (INT)
    Int32(i32),
    /// 64-bit signed integer (BIGINT)
    Int64(i64),
    /// 64-bit floating point (FLOAT)
    Float64(f64),
    /// Text string (VARCHAR, NVARCHAR, CHAR)
    String(String),
    /// Date without time (DATE)
    Date(NaiveDate),
}

impl Value {
    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int16(n) => Some(i64::from(*n)),
            Self::Int32(n) => Some(i64::from(*n)),
            Self::Int64(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Render the value as digits/text for building phone strings.
    ///
    /// Numeric code columns (area code, number) may be stored as integers or
    /// as text depending on the schema; both render the same way. Text is
    /// trimmed of the padding CHAR columns carry.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Self::Int16(n) => Some(n.to_string()),
            Self::Int32(n) => Some(n.to_string()),
            Self::Int64(n) => Some(n.to_string()),
            Self::Float64(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            Self::Float64(n) => Some(n.to_string()),
            Self::String(s) => Some(s.trim().to_string()),
            Self::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// A database row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column names
    columns: Vec<String>,
    /// Column values (same order as columns)
    values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get column names
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get all values
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get value by column index
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from_conversions() {
        assert_eq!(Value::from(11_i32), Value::Int32(11));
        assert_eq!(Value::from("SP"), Value::String("SP".into()));
        assert_eq!(Value::from(None::<i32>), Value::Null);

        let d = NaiveDate::from_ymd_opt(1990, 5, 17).unwrap();
        assert_eq!(Value::from(d), Value::Date(d));
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(Value::Int16(11).to_text().as_deref(), Some("11"));
        assert_eq!(Value::Int64(999998888).to_text().as_deref(), Some("999998888"));
        assert_eq!(Value::Float64(21.0).to_text().as_deref(), Some("21"));
        assert_eq!(Value::String(" 11 ".into()).to_text().as_deref(), Some("11"));
        assert_eq!(Value::Null.to_text(), None);
    }

    #[test]
    fn test_value_as_i64() {
        assert_eq!(Value::String("3".into()).as_i64(), Some(3));
        assert_eq!(Value::Int32(3).as_i64(), Some(3));
        assert_eq!(Value::Bool(true).as_i64(), None);
    }

    #[test]
    fn test_row_get_by_index() {
        let row = Row::new(
            vec!["DDD".into(), "TELEFONE".into()],
            vec![Value::Int16(11), Value::String("999998888".into())],
        );

        assert_eq!(row.len(), 2);
        assert_eq!(row.columns()[1], "TELEFONE");
        assert_eq!(row.get(0), Some(&Value::Int16(11)));
        assert_eq!(row.get(1).and_then(Value::to_text).as_deref(), Some("999998888"));
        assert!(row.get(2).is_none());
    }
}
