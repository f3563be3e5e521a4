//! PostgreSQL driver.
//!
//! One [`PgPool`] per database. The same pool type serves as catalog reader,
//! source reader and target writer, since both sides of a migration are
//! PostgreSQL.

mod catalog;
mod reader;
mod tls;
mod writer;

pub use reader::PgCursor;
pub use tls::SslMode;
pub use writer::{build_insert_sql, render_literal, PgSession};

use std::time::{Duration, Instant};

use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use serde::Serialize;
use tokio_postgres::Config as PgConfig;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::error::{MigrateError, Result};

/// Connection pool for one PostgreSQL database.
#[derive(Clone)]
pub struct PgPool {
    pool: Pool,
    name: String,
}

/// Outcome of a connectivity check.
#[derive(Debug, Clone, Serialize)]
pub struct PingResult {
    pub connected: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PgPool {
    /// Build a pool and check that the database answers.
    pub async fn connect(
        config: &DatabaseConfig,
        max_conns: usize,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let pool = Self::build(config, max_conns, connect_timeout)?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(config.display_name(), e))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(config.display_name(), e))?;

        info!("Connected to PostgreSQL: {}", config.display_name());

        Ok(Self {
            pool,
            name: config.display_name(),
        })
    }

    /// Build a pool without opening any connection.
    pub fn build(
        config: &DatabaseConfig,
        max_conns: usize,
        connect_timeout: Duration,
    ) -> Result<Pool> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("drift-migrate");

        // Connection options for reliability
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(connect_timeout);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match SslMode::parse(&config.ssl_mode)?.connector()? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => {
                warn!(
                    "TLS is disabled for {}. Credentials will be transmitted in plaintext.",
                    config.display_name()
                );
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
        };

        Pool::builder(mgr)
            .max_size(max_conns)
            .build()
            .map_err(|e| {
                MigrateError::pool(e, format!("creating pool for {}", config.display_name()))
            })
    }

    /// Run `SELECT 1` and measure the round trip.
    pub async fn ping(&self) -> PingResult {
        let start = Instant::now();
        let outcome = async {
            let client = self.get("health check").await?;
            client.simple_query("SELECT 1").await?;
            Ok::<_, MigrateError>(())
        }
        .await;

        PingResult {
            connected: outcome.is_ok(),
            latency_ms: start.elapsed().as_millis() as u64,
            error: outcome.err().map(|e| e.to_string()),
        }
    }

    /// Close the pool. Connections in use are closed when returned.
    pub fn close(&self) {
        self.pool.close();
    }

    async fn get(&self, context: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, format!("{} on {}", context, self.name)))
    }
}

/// Detach a connection from its pool so it is closed instead of reused.
///
/// Used when a connection may still be inside a transaction.
fn discard(client: Object) {
    drop(Object::take(client));
}
