use clap::Parser;
use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dbdump::cli::{Cli, Command};
use dbdump::config::{Config, list_config_files};
use dbdump::model::{BackupMode, BackupRequest};
use dbdump::{BackupEngine, RestoreEngine, restore, writer};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    match cli.command {
        Command::ListConfigs => {
            for name in list_config_files()? {
                println!("{name}");
            }
        }

        Command::Dump {
            mode,
            tables,
            permissions,
            output_file,
            version,
            split,
        } => {
            let cfg = Config::resolve(
                cli.connection.config.as_deref(),
                cli.connection.overrides(),
            )?;
            let req = BackupRequest {
                mode: mode.parse::<BackupMode>()?,
                tables,
                include_permissions: permissions,
            };
            info!(engine = %cfg.engine, database = %cfg.db_name, "dumping");

            let engine = BackupEngine::connect(&cfg).await?;
            let artifact = engine.backup(&req).await?;
            writer::save(&artifact, output_file.as_deref(), version.as_deref(), split)?;
        }

        Command::Restore { db_name, file } => {
            let cfg = Config::resolve(
                cli.connection.config.as_deref(),
                cli.connection.overrides(),
            )?;
            info!(engine = %cfg.engine, database = %db_name, file = %file.display(), "restoring");

            let statements = restore::read_script(&file)?;
            let engine = RestoreEngine::connect(&cfg, &db_name).await?;
            engine.replay(&statements).await?;
            info!(database = %db_name, "restore finished");
        }
    }

    Ok(())
}
