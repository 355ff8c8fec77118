//! Identifier validation for phonebatch-rdbc.
//!
//! Values always travel as bound parameters. Identifiers cannot, so any
//! identifier that comes from configuration and ends up in SQL text (the
//! scratch table name) goes through these checks first.

use crate::error::Error;

/// Maximum identifier length SQL Server accepts (`sysname`).
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Maximum length of a local temporary table name, excluding the `#`.
///
/// SQL Server pads `#name` with a session suffix internally and caps the
/// user-visible part at 116 characters.
pub const MAX_TEMP_TABLE_LEN: usize = 116;

/// Validate a SQL identifier (table or column name).
///
/// Enforces strict character rules:
/// - Must not be empty
/// - At most [`MAX_IDENTIFIER_LEN`] characters
/// - Must start with ASCII letter or underscore
/// - May only contain ASCII alphanumeric characters and underscores
///
/// # Examples
///
/// ```
/// use phonebatch_rdbc::security::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("phone_lookup").is_ok());
/// assert!(validate_sql_identifier("_scratch").is_ok());
///
/// assert!(validate_sql_identifier("x; DROP TABLE CONTATOS--").is_err());
/// assert!(validate_sql_identifier("").is_err());
/// assert!(validate_sql_identifier("123abc").is_err());
/// ```
pub fn validate_sql_identifier(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::config("SQL identifier cannot be empty"));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::config(format!(
            "SQL identifier too long: {} chars (max {})",
            name.len(),
            MAX_IDENTIFIER_LEN
        )));
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => {
            return Err(Error::config(format!(
                "Invalid SQL identifier '{}': must start with a letter or underscore",
                name
            )));
        }
    }

    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(Error::config(format!(
                "Invalid SQL identifier '{}': contains invalid character '{}'",
                name, c
            )));
        }
    }

    Ok(())
}

/// Build the session-scoped temporary table name (`#name`) for a plain
/// identifier, validating it first.
///
/// ```
/// use phonebatch_rdbc::security::temp_table_name;
///
/// assert_eq!(temp_table_name("phone_lookup").unwrap(), "#phone_lookup");
/// assert!(temp_table_name("##global").is_err());
/// ```
pub fn temp_table_name(name: &str) -> crate::Result<String> {
    validate_sql_identifier(name)?;
    if name.len() > MAX_TEMP_TABLE_LEN {
        return Err(Error::config(format!(
            "temporary table name too long: {} chars (max {})",
            name.len(),
            MAX_TEMP_TABLE_LEN
        )));
    }
    Ok(format!("#{}", name))
}
