//! Engine adapters.
//!
//! One adapter per database backend. Every adapter offers the same five
//! operations (execute, scalar, table/column/index existence) and differs
//! only in its metadata dialect and client command line. The orchestrator
//! is generic over [`EngineAdapter`], so nothing above this module matches
//! on engine names.

#[cfg(test)]
pub(crate) mod fake;
mod mysql;
mod pgsql;
mod sqlite;

pub use mysql::MysqlAdapter;
pub use pgsql::PgsqlAdapter;
pub use sqlite::SqliteAdapter;

use anyhow::Result;
use serde::Serialize;
use std::fmt;

use crate::client::{CommandOutput, ContainerExec, UnreachableSignals};
use crate::config::EngineSettings;
use crate::timeouts::TimeoutConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Mysql,
    Pgsql,
    Sqlite,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Mysql, EngineKind::Pgsql, EngineKind::Sqlite];

    /// Short name used in flags, file names and config sections
    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Mysql => "mysql",
            EngineKind::Pgsql => "pgsql",
            EngineKind::Sqlite => "sqlite",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EngineKind::Mysql => "MySQL",
            EngineKind::Pgsql => "PostgreSQL",
            EngineKind::Sqlite => "SQLite",
        }
    }

    pub fn default_schema_path(self) -> String {
        format!("sql/poweradmin-{}-db-structure.sql", self.name())
    }

    pub fn default_migration_path(self) -> String {
        format!("sql/poweradmin-{}-update-to-4.1.0.sql", self.name())
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a single-value query.
///
/// `Unavailable` means the database could not be asked at all: the client
/// failed to start, timed out, or never connected. A query that reached the
/// database but failed (missing table or column) reads as an empty value,
/// the same on every engine, so it records as a failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    Value(String),
    Unavailable(String),
}

impl Reading {
    pub fn from_output(result: Result<CommandOutput>, unreachable: &UnreachableSignals) -> Self {
        match result {
            Ok(out) if unreachable.matches(&out) => Reading::Unavailable(out.failure_reason()),
            Ok(out) => {
                let value = out
                    .stdout
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .unwrap_or("")
                    .to_string();
                Reading::Value(value)
            }
            Err(e) => Reading::Unavailable(format!("{e:#}")),
        }
    }

    /// Numeric reading; an empty answer counts as zero.
    pub fn count(&self) -> Option<i64> {
        match self {
            Reading::Value(v) if v.is_empty() => Some(0),
            Reading::Value(v) => v.parse().ok(),
            Reading::Unavailable(_) => None,
        }
    }

    /// Normalize a COUNT(*) answer into `"1"` / `"0"`.
    fn into_flag(self) -> Reading {
        match self.count() {
            Some(n) => Reading::Value(if n > 0 { "1" } else { "0" }.to_string()),
            None => match self {
                Reading::Value(v) => Reading::Unavailable(format!("unexpected answer '{}'", v)),
                unavailable => unavailable,
            },
        }
    }
}

/// Uniform operation set over one database backend.
#[allow(async_fn_in_trait)]
pub trait EngineAdapter {
    fn kind(&self) -> EngineKind;

    /// Human description of how the database is reached (no secrets).
    fn transport(&self) -> String;

    /// Run arbitrary SQL. Only a failure to start the client is an error;
    /// SQL errors come back in the captured output.
    async fn execute(&self, sql: &str) -> Result<CommandOutput>;

    /// Run a query expected to return one row and one column.
    async fn scalar(&self, sql: &str) -> Reading;

    fn table_exists_sql(&self, table: &str) -> String;
    fn column_exists_sql(&self, table: &str, column: &str) -> String;
    fn index_exists_sql(&self, index: &str) -> String;

    /// `DROP TABLE IF EXISTS` for one table.
    fn drop_table_sql(&self, table: &str) -> String;

    /// Statements wrapped around a batch of drops (foreign key toggles).
    fn drop_guard(&self) -> (Option<&'static str>, Option<&'static str>) {
        (None, None)
    }

    /// Extra drops for engines with standalone sequence objects.
    fn drop_sequences_sql(&self, _tables: &[String]) -> Vec<String> {
        Vec::new()
    }

    /// Re-align the users id sequence after an explicit-id insert.
    fn resync_user_sequence_sql(&self) -> Option<String> {
        None
    }

    async fn table_exists(&self, table: &str) -> Reading {
        self.scalar(&self.table_exists_sql(table)).await.into_flag()
    }

    async fn column_exists(&self, table: &str, column: &str) -> Reading {
        self.scalar(&self.column_exists_sql(table, column))
            .await
            .into_flag()
    }

    async fn index_exists(&self, index: &str) -> Reading {
        self.scalar(&self.index_exists_sql(index)).await.into_flag()
    }
}

/// Adapter chosen at startup from the selected engine.
pub enum AnyAdapter {
    Mysql(MysqlAdapter),
    Pgsql(PgsqlAdapter),
    Sqlite(SqliteAdapter),
}

impl AnyAdapter {
    pub fn new(
        kind: EngineKind,
        runtime: &str,
        settings: &EngineSettings,
        timeouts: TimeoutConfig,
    ) -> Self {
        match kind {
            EngineKind::Mysql => AnyAdapter::Mysql(MysqlAdapter::new(runtime, settings, timeouts)),
            EngineKind::Pgsql => AnyAdapter::Pgsql(PgsqlAdapter::new(runtime, settings, timeouts)),
            EngineKind::Sqlite => {
                AnyAdapter::Sqlite(SqliteAdapter::new(runtime, settings, timeouts))
            }
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $adapter:ident => $body:expr) => {
        match $self {
            AnyAdapter::Mysql($adapter) => $body,
            AnyAdapter::Pgsql($adapter) => $body,
            AnyAdapter::Sqlite($adapter) => $body,
        }
    };
}

impl EngineAdapter for AnyAdapter {
    fn kind(&self) -> EngineKind {
        dispatch!(self, a => a.kind())
    }

    fn transport(&self) -> String {
        dispatch!(self, a => a.transport())
    }

    async fn execute(&self, sql: &str) -> Result<CommandOutput> {
        dispatch!(self, a => a.execute(sql).await)
    }

    async fn scalar(&self, sql: &str) -> Reading {
        dispatch!(self, a => a.scalar(sql).await)
    }

    fn table_exists_sql(&self, table: &str) -> String {
        dispatch!(self, a => a.table_exists_sql(table))
    }

    fn column_exists_sql(&self, table: &str, column: &str) -> String {
        dispatch!(self, a => a.column_exists_sql(table, column))
    }

    fn index_exists_sql(&self, index: &str) -> String {
        dispatch!(self, a => a.index_exists_sql(index))
    }

    fn drop_table_sql(&self, table: &str) -> String {
        dispatch!(self, a => a.drop_table_sql(table))
    }

    fn drop_guard(&self) -> (Option<&'static str>, Option<&'static str>) {
        dispatch!(self, a => a.drop_guard())
    }

    fn drop_sequences_sql(&self, tables: &[String]) -> Vec<String> {
        dispatch!(self, a => a.drop_sequences_sql(tables))
    }

    fn resync_user_sequence_sql(&self) -> Option<String> {
        dispatch!(self, a => a.resync_user_sequence_sql())
    }
}

/// Client command lines shared by the container-backed adapters.
#[derive(Debug, Clone)]
pub(crate) struct ContainerClient {
    pub exec: ContainerExec,
    pub query_argv: Vec<String>,
    pub script_argv: Vec<String>,
    pub timeouts: TimeoutConfig,
    pub unreachable: UnreachableSignals,
}

impl ContainerClient {
    async fn script(&self, sql: &str) -> Result<CommandOutput> {
        self.exec
            .command(&self.script_argv)
            .run(sql, self.timeouts.script_timeout)
            .await
    }

    async fn query(&self, sql: &str) -> Reading {
        Reading::from_output(
            self.exec
                .command(&self.query_argv)
                .run(sql, self.timeouts.query_timeout)
                .await,
            &self.unreachable,
        )
    }

    fn describe(&self) -> String {
        self.exec.command(&self.script_argv).display()
    }
}
