//! Database driver implementations.
//!
//! Both ends of a migration are PostgreSQL, so there is a single driver.
//! It implements the catalog, reader and writer seams of [`crate::core`].

pub mod postgres;

pub use postgres::{PgPool, PingResult, SslMode};
