use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::EngineKind;
use crate::expectations::Expectations;
use crate::timeouts::{parse_duration, TimeoutConfig};

pub const DEFAULT_CONFIG_FILE: &str = "migverify.toml";
pub const DEFAULT_TAG: &str = "v4.0.5";
pub const DEFAULT_RUNTIME: &str = "docker";
pub const DEFAULT_IMPORTER: &str = ".devcontainer/scripts/import-test-data.sh";

/// Main configuration structure loaded from migverify.toml
#[derive(Deserialize, Default, Debug)]
pub struct Config {
    /// Git tag holding the historical (pre-migration) schema
    pub tag: Option<String>,
    pub container_runtime: Option<String>,
    pub paths: Option<PathsConfig>,
    pub mysql: Option<EngineConfig>,
    pub pgsql: Option<EngineConfig>,
    pub sqlite: Option<EngineConfig>,
    pub timeouts: Option<TimeoutsConfig>,
    #[serde(default)]
    pub expectations: Expectations,
    pub schema: Option<SchemaConfig>,
}

#[derive(Deserialize, Debug, Default)]
pub struct PathsConfig {
    /// Repository root; schema and migration paths are relative to it
    pub root: Option<String>,
    pub importer: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct EngineConfig {
    pub container: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database name, or the database file path for SQLite
    pub database: Option<String>,
    /// Client binary inside the container
    pub client: Option<String>,
    pub schema: Option<String>,
    pub migration: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct TimeoutsConfig {
    pub query: Option<String>,
    pub script: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SchemaConfig {
    /// Additional application tables to drop before loading a schema
    pub extra_drop_tables: Option<Vec<String>>,
}

/// Fully resolved connection descriptor for one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub container: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub client: String,
    pub schema_path: String,
    pub migration_path: String,
}

struct EngineDefaults {
    env_prefix: &'static str,
    container: &'static str,
    user: &'static str,
    password: &'static str,
    database: &'static str,
    client: &'static str,
}

fn engine_defaults(kind: EngineKind) -> EngineDefaults {
    match kind {
        EngineKind::Mysql => EngineDefaults {
            env_prefix: "MYSQL",
            container: "mariadb",
            user: "pdns",
            password: "poweradmin",
            database: "pdns",
            client: "mysql",
        },
        EngineKind::Pgsql => EngineDefaults {
            env_prefix: "PGSQL",
            container: "postgres",
            user: "pdns",
            password: "poweradmin",
            database: "pdns",
            client: "psql",
        },
        EngineKind::Sqlite => EngineDefaults {
            env_prefix: "SQLITE",
            container: "sqlite",
            user: "",
            password: "",
            database: "/data/pdns.db",
            client: "sqlite3",
        },
    }
}

impl Config {
    /// Load config from file, or return default if no config exists.
    /// If an explicit path is provided via --config, it MUST exist (error if not).
    /// If no path is provided, check ./migverify.toml (use default if not found).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => {
                if !p.exists() {
                    bail!("Config file not found: {}", p.display());
                }
                p
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    default_path
                } else {
                    return Ok(Config::default());
                }
            }
        };

        let contents = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate_paths()?;
        Ok(config)
    }

    /// Schema, migration and importer paths are repository-relative.
    fn validate_paths(&self) -> Result<()> {
        for kind in EngineKind::ALL {
            if let Some(engine) = self.engine_config(kind) {
                let section = kind.name();
                if let Some(ref p) = engine.schema {
                    Self::validate_path(p, &format!("{}.schema", section))?;
                }
                if let Some(ref p) = engine.migration {
                    Self::validate_path(p, &format!("{}.migration", section))?;
                }
            }
        }
        if let Some(ref paths) = self.paths {
            if let Some(ref p) = paths.importer {
                Self::validate_path(p, "paths.importer")?;
            }
        }
        Ok(())
    }

    fn validate_path(path: &str, field: &str) -> Result<()> {
        if path.contains("..") {
            bail!(
                "Invalid {} path '{}': paths cannot contain '..'",
                field,
                path
            );
        }
        if Path::new(path).is_absolute() {
            bail!("Invalid {} path '{}': paths must be relative", field, path);
        }
        Ok(())
    }

    fn engine_config(&self, kind: EngineKind) -> Option<&EngineConfig> {
        match kind {
            EngineKind::Mysql => self.mysql.as_ref(),
            EngineKind::Pgsql => self.pgsql.as_ref(),
            EngineKind::Sqlite => self.sqlite.as_ref(),
        }
    }

    /// Historical tag with resolution order: env > config > default
    pub fn tag(&self) -> String {
        self.tag_with(&env_lookup)
    }

    fn tag_with(&self, env: &dyn Fn(&str) -> Option<String>) -> String {
        env("MIGVERIFY_TAG")
            .or_else(|| self.tag.clone())
            .unwrap_or_else(|| DEFAULT_TAG.to_string())
    }

    pub fn container_runtime(&self) -> String {
        env_lookup("CONTAINER_RUNTIME")
            .or_else(|| self.container_runtime.clone())
            .unwrap_or_else(|| DEFAULT_RUNTIME.to_string())
    }

    pub fn repo_root(&self) -> PathBuf {
        PathBuf::from(
            self.paths
                .as_ref()
                .and_then(|p| p.root.as_deref())
                .unwrap_or("."),
        )
    }

    pub fn importer_path(&self) -> PathBuf {
        self.repo_root().join(
            self.paths
                .as_ref()
                .and_then(|p| p.importer.as_deref())
                .unwrap_or(DEFAULT_IMPORTER),
        )
    }

    pub fn extra_drop_tables(&self) -> Vec<String> {
        self.schema
            .as_ref()
            .and_then(|s| s.extra_drop_tables.clone())
            .unwrap_or_default()
    }

    /// Resolve one engine's settings: env > config > default.
    ///
    /// Environment variables are `<PREFIX>_CONTAINER`, `<PREFIX>_USER`,
    /// `<PREFIX>_PASSWORD` and `<PREFIX>_DATABASE` with prefixes `MYSQL`,
    /// `PGSQL` and `SQLITE`.
    pub fn engine_settings(&self, kind: EngineKind) -> EngineSettings {
        self.engine_settings_with(kind, &env_lookup)
    }

    fn engine_settings_with(
        &self,
        kind: EngineKind,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> EngineSettings {
        let defaults = engine_defaults(kind);
        let file = self.engine_config(kind).cloned().unwrap_or_default();
        let pick = |suffix: &str, from_file: Option<String>, fallback: &str| {
            env(&format!("{}_{}", defaults.env_prefix, suffix))
                .or(from_file)
                .unwrap_or_else(|| fallback.to_string())
        };

        EngineSettings {
            container: pick("CONTAINER", file.container, defaults.container),
            user: pick("USER", file.user, defaults.user),
            password: pick("PASSWORD", file.password, defaults.password),
            database: pick("DATABASE", file.database, defaults.database),
            client: file.client.unwrap_or_else(|| defaults.client.to_string()),
            schema_path: file.schema.unwrap_or_else(|| kind.default_schema_path()),
            migration_path: file
                .migration
                .unwrap_or_else(|| kind.default_migration_path()),
        }
    }

    /// Timeouts with resolution order: CLI > config > default
    pub fn timeouts(&self, cli_query: Option<&str>, cli_script: Option<&str>) -> Result<TimeoutConfig> {
        let file = self.timeouts.as_ref();
        let query = cli_query
            .or_else(|| file.and_then(|t| t.query.as_deref()))
            .map(parse_duration)
            .transpose()
            .context("Invalid query timeout")?;
        let script = cli_script
            .or_else(|| file.and_then(|t| t.script.as_deref()))
            .map(parse_duration)
            .transpose()
            .context("Invalid script timeout")?;
        Ok(TimeoutConfig::new(query, script))
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_config_load_nonexistent_explicit_path_errors() {
        let result = Config::load(Some(Path::new("/nonexistent/path/migverify.toml")));
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[test]
    fn test_config_load_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
tag = "v4.0.4"

[mysql]
container = "db-mysql"
password = "pw"

[timeouts]
query = "10s"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.tag_with(&no_env), "v4.0.4");
        let mysql = config.engine_settings_with(EngineKind::Mysql, &no_env);
        assert_eq!(mysql.container, "db-mysql");
        assert_eq!(mysql.password, "pw");
        assert_eq!(mysql.user, "pdns");
        assert_eq!(
            config.timeouts(None, None).unwrap().query_timeout,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not valid toml [[[").unwrap();

        let result = Config::load(Some(file.path()));
        assert!(result.is_err());
        assert!(format!("{:#}", result.unwrap_err()).contains("Failed to parse"));
    }

    #[test]
    fn test_defaults_without_config() {
        let config = Config::default();
        assert_eq!(config.tag_with(&no_env), DEFAULT_TAG);

        let pgsql = config.engine_settings_with(EngineKind::Pgsql, &no_env);
        assert_eq!(pgsql.container, "postgres");
        assert_eq!(pgsql.client, "psql");
        assert_eq!(pgsql.schema_path, "sql/poweradmin-pgsql-db-structure.sql");

        let sqlite = config.engine_settings_with(EngineKind::Sqlite, &no_env);
        assert_eq!(sqlite.database, "/data/pdns.db");
        assert_eq!(sqlite.client, "sqlite3");
    }

    #[test]
    fn test_env_overrides_config() {
        let config = Config::parse(
            r#"
[pgsql]
container = "from-file"
database = "filedb"
"#,
        )
        .unwrap();
        let vars: HashMap<&str, &str> =
            HashMap::from([("PGSQL_CONTAINER", "from-env"), ("MIGVERIFY_TAG", "v9")]);
        let env = |k: &str| vars.get(k).map(|v| v.to_string());

        let pgsql = config.engine_settings_with(EngineKind::Pgsql, &env);
        assert_eq!(pgsql.container, "from-env");
        assert_eq!(pgsql.database, "filedb");
        assert_eq!(config.tag_with(&env), "v9");
    }

    #[test]
    fn test_cli_timeout_overrides_config() {
        let config = Config::parse("[timeouts]\nscript = \"2m\"\nquery = \"1s\"\n").unwrap();
        let timeouts = config.timeouts(Some("5s"), None).unwrap();
        assert_eq!(timeouts.query_timeout, Duration::from_secs(5));
        assert_eq!(timeouts.script_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_invalid_timeout_errors() {
        let config = Config::default();
        assert!(config.timeouts(Some("soon"), None).is_err());
    }

    #[test]
    fn test_path_traversal_rejected() {
        let result = Config::parse("[mysql]\nmigration = \"../other/update.sql\"\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot contain '..'"));
    }

    #[test]
    fn test_absolute_path_rejected() {
        let result = Config::parse("[paths]\nimporter = \"/usr/bin/import\"\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("must be relative"));
    }

    #[test]
    fn test_expectations_section() {
        let config = Config::parse("[expectations]\nperm_templ_after = 6\n").unwrap();
        assert_eq!(config.expectations.perm_templ_after, 6);
        assert_eq!(config.expectations.perm_items_after, 27);
    }

    #[test]
    fn test_importer_and_extra_tables() {
        let config = Config::parse(
            r#"
[paths]
root = "/srv/poweradmin"

[schema]
extra_drop_tables = ["user_groups"]
"#,
        )
        .unwrap();
        assert_eq!(
            config.importer_path(),
            PathBuf::from("/srv/poweradmin").join(DEFAULT_IMPORTER)
        );
        assert_eq!(config.extra_drop_tables(), vec!["user_groups".to_string()]);
    }
}
