use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Database backup and restore utility.
#[derive(Debug, Parser)]
#[command(name = "dbdump", about = "Database backup and restore utility")]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection parameters, overridable by `--config` or the environment.
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Path to a TOML configuration file; takes precedence over the flags below.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Engine family: mysql or postgres.
    #[arg(long, global = true)]
    pub engine: Option<String>,

    /// Database host.
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Database user.
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Database password.
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Database name.
    #[arg(long, global = true)]
    pub db_name: Option<String>,
}

impl ConnectionArgs {
    /// Explicitly provided values as figment override pairs.
    pub fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(engine) = &self.engine {
            pairs.push(("engine", engine.clone()));
        }
        if let Some(host) = &self.host {
            pairs.push(("host", host.clone()));
        }
        if let Some(user) = &self.user {
            pairs.push(("user", user.clone()));
        }
        if let Some(password) = &self.password {
            pairs.push(("password", password.clone()));
        }
        if let Some(db_name) = &self.db_name {
            pairs.push(("db_name", db_name.clone()));
        }
        pairs
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Back up structure and/or data.
    Dump {
        /// What to emit: structure, data or structure_data.
        #[arg(long, default_value = "structure_data")]
        mode: String,

        /// Explicit table subset; omit to back up all tables
        /// (which also unlocks sequence/enum-type backup).
        #[arg(short, long, num_args = 1..)]
        tables: Option<Vec<String>>,

        /// Include permission grants.
        #[arg(long)]
        permissions: bool,

        /// Write the whole artifact into one file under ./single_backups.
        #[arg(short, long)]
        output_file: Option<String>,

        /// Version tag to prefix the output file name with.
        #[arg(short = 'v', long)]
        version: Option<String>,

        /// Split into per-table files under ./multiple_backups.
        #[arg(short, long)]
        split: bool,
    },

    /// Replay a SQL script into a database, creating it if missing.
    Restore {
        /// Name of the database to restore into.
        db_name: String,

        /// Path to the `;`-terminated SQL script.
        #[arg(short = 'f', long)]
        file: PathBuf,
    },

    /// List configuration files (*.toml) in the working directory.
    ListConfigs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_defaults_to_structure_data() {
        let cli = Cli::parse_from(["dbdump", "dump"]);
        let Command::Dump { mode, tables, .. } = cli.command else {
            panic!("expected dump command");
        };
        assert_eq!(mode, "structure_data");
        assert!(tables.is_none());
    }

    #[test]
    fn dump_accepts_table_subset_and_flags() {
        let cli = Cli::parse_from([
            "dbdump",
            "--engine",
            "mysql",
            "dump",
            "--mode",
            "structure",
            "-t",
            "users",
            "orders",
            "--permissions",
        ]);
        assert_eq!(cli.connection.engine.as_deref(), Some("mysql"));
        let Command::Dump {
            tables,
            permissions,
            ..
        } = cli.command
        else {
            panic!("expected dump command");
        };
        assert_eq!(tables.unwrap(), ["users", "orders"]);
        assert!(permissions);
    }

    #[test]
    fn restore_takes_database_and_script() {
        let cli = Cli::parse_from(["dbdump", "restore", "shop", "-f", "shop.sql"]);
        let Command::Restore { db_name, file } = cli.command else {
            panic!("expected restore command");
        };
        assert_eq!(db_name, "shop");
        assert_eq!(file, PathBuf::from("shop.sql"));
    }
}
