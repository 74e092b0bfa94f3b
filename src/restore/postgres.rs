//! Postgres-family restore replayer.
//!
//! First connects to the administrative `postgres` database to create the
//! target database when missing, then reconnects to the target and
//! replays with autocommit: each statement is durable on its own, so a
//! mid-script failure leaves a partially-applied database. That asymmetry
//! with the MySQL path is preserved deliberately.

use crate::config::Config;
use crate::error::DumpError;

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};
use tracing::{debug, info};

pub struct PostgresRestore {
    conn: PgConnection,
}

impl PostgresRestore {
    /// Ensure the target database exists via the administrative database,
    /// then connect to the target.
    pub async fn connect(cfg: &Config, db_name: &str) -> Result<PostgresRestore, DumpError> {
        let admin_opts = PgConnectOptions::new()
            .host(&cfg.host)
            .username(&cfg.user)
            .password(&cfg.password)
            .database("postgres");
        let mut admin =
            PgConnection::connect_with(&admin_opts)
                .await
                .map_err(|e| DumpError::Connection {
                    host: cfg.host.clone(),
                    user: cfg.user.clone(),
                    source: e,
                })?;

        let exists = sqlx::query("SELECT 1 FROM pg_database WHERE datname = $1")
            .bind(db_name)
            .fetch_optional(&mut admin)
            .await
            .map_err(|e| DumpError::restore("pg_database lookup", e))?
            .is_some();
        if !exists {
            // CREATE DATABASE cannot be parameterized; the name comes from
            // the config layer and is passed through opaque.
            admin
                .execute(format!("CREATE DATABASE {db_name}").as_str())
                .await
                .map_err(|e| DumpError::restore("CREATE DATABASE", e))?;
            info!(database = %db_name, "database created");
        }
        admin
            .close()
            .await
            .map_err(|e| DumpError::restore("close admin connection", e))?;

        let opts = PgConnectOptions::new()
            .host(&cfg.host)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(db_name);
        let conn = PgConnection::connect_with(&opts)
            .await
            .map_err(|e| DumpError::Connection {
                host: cfg.host.clone(),
                user: cfg.user.clone(),
                source: e,
            })?;
        Ok(PostgresRestore { conn })
    }

    /// Execute each non-blank statement in order with autocommit. The
    /// first failure aborts the rest; already-executed statements stay
    /// applied. Consumes the replayer; the connection is released on
    /// every exit path.
    pub async fn replay(mut self, statements: &[String]) -> Result<(), DumpError> {
        let mut executed = 0usize;
        for stmt in statements {
            if stmt.trim().is_empty() {
                continue;
            }
            self.conn
                .execute(stmt.as_str())
                .await
                .map_err(|e| DumpError::restore(stmt, e))?;
            executed += 1;
        }
        debug!(executed, "restore complete");
        self.conn
            .close()
            .await
            .map_err(|e| DumpError::restore("close", e))?;
        Ok(())
    }
}
