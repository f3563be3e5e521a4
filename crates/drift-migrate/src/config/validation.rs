//! Configuration validation.

use super::{Config, DatabaseConfig};
use crate::core::identifier::validate_identifier;
use crate::error::{MigrateError, Result};
use std::collections::HashSet;

const SSL_MODES: &[&str] = &["disable", "require", "verify-ca", "verify-full"];

/// Validate the configuration.
///
/// Checks the file on its own. Whether the listed tables and columns exist is
/// decided later against the live catalogs.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source", &config.source)?;
    validate_database("target", &config.target)?;

    // Cannot migrate to the same database
    if config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    let migration = &config.migration;
    if migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if migration.max_connections == 0 {
        return Err(MigrateError::Config(
            "migration.max_connections must be at least 1".into(),
        ));
    }

    let mut seen = HashSet::new();
    for entry in &migration.tables {
        validate_identifier(&entry.table)?;
        if !seen.insert(entry.table.as_str()) {
            return Err(MigrateError::Config(format!(
                "table '{}' appears more than once in migration.tables",
                entry.table
            )));
        }
        for pair in &entry.columns {
            validate_identifier(pair.source())?;
            validate_identifier(pair.target())?;
        }
        for name in entry.constants.keys().chain(entry.conflict_key.iter()) {
            validate_identifier(name)?;
        }
    }

    Ok(())
}

fn validate_database(side: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", side)));
    }
    if db.database.is_empty() {
        return Err(MigrateError::Config(format!(
            "{}.database is required",
            side
        )));
    }
    if db.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", side)));
    }
    if db.schema.is_empty() {
        return Err(MigrateError::Config(format!("{}.schema is required", side)));
    }
    if !SSL_MODES.contains(&db.ssl_mode.to_lowercase().as_str()) {
        return Err(MigrateError::Config(format!(
            "{}.ssl_mode must be one of {}, got '{}'",
            side,
            SSL_MODES.join(", "),
            db.ssl_mode
        )));
    }
    Ok(())
}
