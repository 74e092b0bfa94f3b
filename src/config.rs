use crate::error::DumpError;
use crate::model::EngineFamily;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Connection parameters for one invocation. All values are opaque
/// strings handed to the driver; the core never validates them.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineFamily,
    pub host: String,
    pub user: String,
    pub password: String,
    pub db_name: String,
}

impl Config {
    /// Layer an optional TOML file under `DBDUMP_`-prefixed environment
    /// variables; the environment wins.
    pub fn load(path: Option<&Path>) -> Result<Config, DumpError> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let config = figment.merge(Env::prefixed("DBDUMP_")).extract()?;
        Ok(config)
    }

    /// Resolve the effective config for a run: a config file when given,
    /// otherwise the environment overlaid with any explicit CLI values.
    pub fn resolve(
        path: Option<&Path>,
        overrides: impl IntoIterator<Item = (&'static str, String)>,
    ) -> Result<Config, DumpError> {
        if let Some(path) = path {
            return Config::load(Some(path));
        }
        let mut figment = Figment::new().merge(Env::prefixed("DBDUMP_"));
        for (key, value) in overrides {
            figment = figment.merge((key, value));
        }
        Ok(figment.extract()?)
    }
}

/// List configuration files (`*.toml`) in the working directory.
pub fn list_config_files() -> Result<Vec<String>, DumpError> {
    let mut names: Vec<String> = fs::read_dir(".")?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
        })
        .filter_map(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
        })
        .collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn config_loads_from_toml_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "db.toml",
                r#"
                engine = "postgres"
                host = "localhost"
                user = "admin"
                password = "secret"
                db_name = "shop"
                "#,
            )?;
            let cfg = Config::load(Some(Path::new("db.toml"))).expect("config should load");
            assert_eq!(cfg.engine, EngineFamily::Postgres);
            assert_eq!(cfg.host, "localhost");
            assert_eq!(cfg.db_name, "shop");
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file_values() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "db.toml",
                r#"
                engine = "mysql"
                host = "localhost"
                user = "admin"
                password = "secret"
                db_name = "shop"
                "#,
            )?;
            jail.set_env("DBDUMP_HOST", "db.internal");
            let cfg = Config::load(Some(Path::new("db.toml"))).expect("config should load");
            assert_eq!(cfg.engine, EngineFamily::Mysql);
            assert_eq!(cfg.host, "db.internal");
            Ok(())
        });
    }

    #[test]
    fn cli_overrides_beat_environment() {
        Jail::expect_with(|jail| {
            jail.set_env("DBDUMP_ENGINE", "mysql");
            jail.set_env("DBDUMP_HOST", "db.internal");
            jail.set_env("DBDUMP_USER", "admin");
            jail.set_env("DBDUMP_PASSWORD", "secret");
            jail.set_env("DBDUMP_DB_NAME", "shop");
            let cfg = Config::resolve(None, [("host", "edge.internal".to_string())])
                .expect("config should resolve");
            assert_eq!(cfg.host, "edge.internal");
            assert_eq!(cfg.user, "admin");
            Ok(())
        });
    }

    #[test]
    fn missing_fields_are_a_config_error() {
        Jail::expect_with(|jail| {
            jail.create_file("db.toml", "engine = \"mysql\"\n")?;
            let err = Config::load(Some(Path::new("db.toml"))).unwrap_err();
            assert!(matches!(err, DumpError::Config(_)));
            Ok(())
        });
    }
}
