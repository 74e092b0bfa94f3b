pub mod mysql;
pub mod postgres;
pub mod statement;

use crate::config::Config;
use crate::error::DumpError;
use crate::model::{BackupArtifact, BackupRequest, EngineFamily};

use tracing::info;

pub use mysql::MySqlBackup;
pub use postgres::PostgresBackup;

/// Engine-family dispatch for backups. The variant is resolved once at
/// construction from the configured family; both variants share the
/// request/artifact contract and nothing else.
pub enum BackupEngine {
    Mysql(MySqlBackup),
    Postgres(PostgresBackup),
}

impl BackupEngine {
    pub async fn connect(cfg: &Config) -> Result<BackupEngine, DumpError> {
        match cfg.engine {
            EngineFamily::Mysql => Ok(BackupEngine::Mysql(MySqlBackup::connect(cfg).await?)),
            EngineFamily::Postgres => {
                Ok(BackupEngine::Postgres(PostgresBackup::connect(cfg).await?))
            }
        }
    }

    /// Run one backup. Consumes the engine: each invocation owns its
    /// connection and in-memory model exclusively and discards both.
    pub async fn backup(self, req: &BackupRequest) -> Result<BackupArtifact, DumpError> {
        info!(
            mode = ?req.mode,
            filtered = req.tables.is_some(),
            permissions = req.include_permissions,
            "starting backup"
        );
        match self {
            BackupEngine::Mysql(engine) => engine.backup(req).await.map(BackupArtifact::Mysql),
            BackupEngine::Postgres(engine) => {
                engine.backup(req).await.map(BackupArtifact::Postgres)
            }
        }
    }
}
