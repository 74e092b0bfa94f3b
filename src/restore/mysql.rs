//! MySQL-family restore replayer.
//!
//! Connects to the server without selecting a database, creates the
//! target database when it does not exist yet, switches to it and replays
//! the script with autocommit off. The single COMMIT happens at the very
//! end, only on overall success; a mid-script failure leaves the
//! uncommitted work to be rolled back when the connection drops.

use crate::config::Config;
use crate::error::DumpError;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Executor};
use tracing::{debug, info};

pub struct MySqlRestore {
    conn: MySqlConnection,
}

impl MySqlRestore {
    /// Connect, ensure the target database exists and switch to it.
    /// Creating the database is idempotent: a second run against an
    /// already-created database skips the CREATE entirely.
    pub async fn connect(cfg: &Config, db_name: &str) -> Result<MySqlRestore, DumpError> {
        let opts = MySqlConnectOptions::new()
            .host(&cfg.host)
            .username(&cfg.user)
            .password(&cfg.password);
        let mut conn =
            MySqlConnection::connect_with(&opts)
                .await
                .map_err(|e| DumpError::Connection {
                    host: cfg.host.clone(),
                    user: cfg.user.clone(),
                    source: e,
                })?;

        let exists = conn
            .fetch_optional(format!("SHOW DATABASES LIKE '{db_name}'").as_str())
            .await
            .map_err(|e| DumpError::restore("SHOW DATABASES", e))?
            .is_some();
        if !exists {
            conn.execute(format!("CREATE DATABASE {db_name}").as_str())
                .await
                .map_err(|e| DumpError::restore("CREATE DATABASE", e))?;
            info!(database = %db_name, "database created");
        }

        conn.execute(format!("USE {db_name}").as_str())
            .await
            .map_err(|e| DumpError::restore("USE", e))?;
        conn.execute("SET autocommit=0")
            .await
            .map_err(|e| DumpError::restore("SET autocommit=0", e))?;

        Ok(MySqlRestore { conn })
    }

    /// Execute each non-blank statement in order, then commit once and
    /// close. Consumes the replayer; on any failure the connection drops
    /// without committing.
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
        self.conn
            .execute("COMMIT")
            .await
            .map_err(|e| DumpError::restore("COMMIT", e))?;
        debug!(executed, "restore committed");
        self.conn
            .close()
            .await
            .map_err(|e| DumpError::restore("close", e))?;
        Ok(())
    }
}
