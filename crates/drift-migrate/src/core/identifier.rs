//! Identifier validation and quoting for generated SQL.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! statement the engine builds (cursor declarations, TRUNCATE, INSERT) splices
//! names in through these helpers. Names come from the live catalogs and the
//! plan file; both are validated before quoting.

use crate::error::{MigrateError, Result};

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1).
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier.
///
/// Rejects empty names, names containing NUL bytes, and names longer than
/// PostgreSQL keeps.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains a null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes, so reserved words such as `user` and `group` are safe.
///
/// ```
/// use drift_migrate::core::identifier::quote_pg;
/// assert_eq!(quote_pg("group").unwrap(), "\"group\"");
/// ```
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a PostgreSQL table name with its schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Quote a list of identifiers and join them with `", "`.
pub fn quote_list<S: AsRef<str>>(names: &[S]) -> Result<String> {
    let quoted = names
        .iter()
        .map(|n| quote_pg(n.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}

/// Escape a string for use inside a single-quoted SQL literal.
///
/// Assumes `standard_conforming_strings = on` (the server default since 9.1).
pub fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}
