pub mod mysql;
pub mod postgres;

use crate::config::Config;
use crate::error::DumpError;
use crate::model::EngineFamily;

use std::fs;
use std::path::Path;
use tracing::info;

pub use mysql::MySqlRestore;
pub use postgres::PostgresRestore;

/// Split a stored script into statements on the terminator character,
/// discarding a single trailing empty fragment. The split is purely
/// lexical: a `;` inside a string literal, comment or procedural body
/// breaks it. That is a documented limitation of the format, not a case
/// to special-case here.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut parts: Vec<String> = script.split(';').map(str::to_string).collect();
    if parts.last().is_some_and(String::is_empty) {
        parts.pop();
    }
    parts
}

/// Read a UTF-8 script file and split it into statements.
pub fn read_script(path: &Path) -> Result<Vec<String>, DumpError> {
    let text = fs::read_to_string(path)?;
    Ok(split_statements(&text))
}

/// Engine-family dispatch for restores, resolved once at construction.
/// Connecting ensures the target database exists; `replay` then executes
/// the script against it.
pub enum RestoreEngine {
    Mysql(MySqlRestore),
    Postgres(PostgresRestore),
}

impl RestoreEngine {
    pub async fn connect(cfg: &Config, db_name: &str) -> Result<RestoreEngine, DumpError> {
        match cfg.engine {
            EngineFamily::Mysql => Ok(RestoreEngine::Mysql(
                MySqlRestore::connect(cfg, db_name).await?,
            )),
            EngineFamily::Postgres => Ok(RestoreEngine::Postgres(
                PostgresRestore::connect(cfg, db_name).await?,
            )),
        }
    }

    /// Replay statements sequentially, in split order. The first failing
    /// statement aborts the rest; whether already-executed statements are
    /// durable depends on the family's commit mode (the MySQL path commits
    /// once at the very end, the Postgres path autocommits per statement).
    pub async fn replay(self, statements: &[String]) -> Result<(), DumpError> {
        info!(statements = statements.len(), "starting restore");
        match self {
            RestoreEngine::Mysql(engine) => engine.replay(statements).await,
            RestoreEngine::Postgres(engine) => engine.replay(statements).await,
        }
    }
}
