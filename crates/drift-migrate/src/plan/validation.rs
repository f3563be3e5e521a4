//! Plan validation against the live schemas.

use super::{BindingValue, ConflictMode, MigrationPlan};
use crate::core::schema::normalize_type;
use crate::core::{ColumnKind, SqlValue, TableSchema};
use crate::error::{MigrateError, Result};
use std::collections::HashSet;

/// Checks a plan against the source and target schemas before any row is read.
pub struct PlanValidator;

impl PlanValidator {
    /// Validate a plan. The first violation is returned as `PlanValidation`.
    pub fn validate(
        plan: &MigrationPlan,
        source: &TableSchema,
        target: &TableSchema,
    ) -> Result<()> {
        let fail = |message: String| Err(MigrateError::plan(&plan.table, message));

        if plan.source_columns.is_empty() {
            return fail("plan copies no columns".into());
        }
        if plan.source_columns.len() != plan.target_columns.len() {
            return fail(format!(
                "{} source column(s) but {} target column(s)",
                plan.source_columns.len(),
                plan.target_columns.len()
            ));
        }

        for name in &plan.source_columns {
            if !source.has_column(name) {
                return fail(format!("source has no column '{}'", name));
            }
        }

        let mut written = HashSet::new();
        for name in plan.write_columns() {
            if !target.has_column(&name) {
                return fail(format!("target has no column '{}'", name));
            }
            if !written.insert(name.clone()) {
                return fail(format!("target column '{}' is written twice", name));
            }
        }

        for binding in &plan.constants {
            // Present, checked above.
            let Some(tgt) = target.column(&binding.target) else {
                continue;
            };
            let literal = match &binding.value {
                BindingValue::Literal(value) => value,
                BindingValue::Column { column, fallback } => {
                    let Some(src) = source.column(column) else {
                        return fail(format!(
                            "'{}' refers to source column '{}', which does not exist",
                            binding.target, column
                        ));
                    };
                    if !types_reconcilable(&src.data_type, &tgt.data_type) {
                        return fail(format!(
                            "cannot fill '{}' ({}) from '{}' ({})",
                            binding.target, tgt.data_type, column, src.data_type
                        ));
                    }
                    fallback
                }
            };
            if !literal_fits(literal, &tgt.data_type) {
                return fail(format!(
                    "value '{}' does not fit '{}' ({})",
                    literal, binding.target, tgt.data_type
                ));
            }
        }

        if plan.mode == ConflictMode::Merge {
            if plan.conflict_key.is_empty() {
                return fail("merge needs a conflict key and the target has no primary key".into());
            }
            for key in &plan.conflict_key {
                if !written.contains(key) {
                    return fail(format!("conflict key column '{}' is not written", key));
                }
            }
        }

        for (s, t) in plan.source_columns.iter().zip(&plan.target_columns) {
            // Both exist, checked above.
            if let (Some(src), Some(tgt)) = (source.column(s), target.column(t)) {
                if !types_reconcilable(&src.data_type, &tgt.data_type) {
                    return fail(format!(
                        "cannot copy '{}' ({}) into '{}' ({})",
                        s, src.data_type, t, tgt.data_type
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Numeric widening ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Numeric {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal,
}

fn numeric(data_type: &str) -> Option<Numeric> {
    match data_type {
        "smallint" | "int2" => Some(Numeric::SmallInt),
        "integer" | "int" | "int4" => Some(Numeric::Integer),
        "bigint" | "int8" => Some(Numeric::BigInt),
        "real" | "float4" => Some(Numeric::Real),
        "double precision" | "float8" => Some(Numeric::Double),
        "numeric" | "decimal" => Some(Numeric::Decimal),
        _ => None,
    }
}

fn widens(from: Numeric, to: Numeric) -> bool {
    use Numeric::*;
    match from {
        SmallInt | Integer | BigInt => from <= to,
        Real => matches!(to, Real | Double),
        Double => to == Double,
        Decimal => to == Decimal,
    }
}

/// Whether values of `source` type can be written into a `target` column.
///
/// Accepted: the same declared type, text into text, text and json/jsonb in
/// either direction, json and jsonb in either direction, and numeric widening.
pub fn types_reconcilable(source: &str, target: &str) -> bool {
    let s = normalize_type(source);
    let t = normalize_type(target);
    if s == t {
        return true;
    }

    let (sk, tk) = (ColumnKind::from_data_type(&s), ColumnKind::from_data_type(&t));
    match (sk, tk) {
        (ColumnKind::Text | ColumnKind::Structured, ColumnKind::Text | ColumnKind::Structured) => {
            return true
        }
        (ColumnKind::Other, ColumnKind::Other) => {}
        _ => return false,
    }

    match (numeric(&s), numeric(&t)) {
        (Some(from), Some(to)) => widens(from, to),
        _ => false,
    }
}

/// Whether a configured literal can be written into a `target` column.
///
/// Text is accepted wherever the server parses it from a string literal, except
/// for numeric and boolean columns.
fn literal_fits(value: &SqlValue, target: &str) -> bool {
    let t = normalize_type(target);
    match ColumnKind::from_data_type(&t) {
        ColumnKind::Structured | ColumnKind::Text => return !matches!(value, SqlValue::Bytes(_)),
        ColumnKind::Other => {}
    }

    if let Some(column) = numeric(&t) {
        return match value {
            SqlValue::Null | SqlValue::Int(_) => true,
            SqlValue::Float(_) => column >= Numeric::Real,
            SqlValue::Decimal(_) => column == Numeric::Decimal,
            _ => false,
        };
    }

    match (value, t.as_str()) {
        (SqlValue::Null, _) => true,
        (SqlValue::Bool(_), "boolean" | "bool") => true,
        (SqlValue::Uuid(_), "uuid") => true,
        (SqlValue::Text(s), "uuid") => uuid::Uuid::parse_str(s).is_ok(),
        (SqlValue::Bytes(_), "bytea") => true,
        (SqlValue::Timestamp(_) | SqlValue::TimestampTz(_), _) => t.starts_with("timestamp"),
        (SqlValue::Date(_), "date") => true,
        (SqlValue::Time(_), "time" | "time without time zone") => true,
        (SqlValue::Text(_), "boolean" | "bool") => false,
        (SqlValue::Text(_), _) => true,
        _ => false,
    }
}
