//! SQLite adapter. The database file lives inside its container.

use anyhow::Result;

use super::{ContainerClient, EngineAdapter, EngineKind, Reading};
use crate::client::{CommandOutput, ContainerExec, UnreachableSignals};
use crate::config::EngineSettings;
use crate::sql::{quote_ident, quote_literal};
use crate::timeouts::TimeoutConfig;

/// sqlite3 exits 1 for every error; only the message tells them apart.
const UNREACHABLE: UnreachableSignals = UnreachableSignals {
    exit_codes: &[],
    stderr_markers: &["unable to open database", "database is locked"],
};

pub struct SqliteAdapter {
    client: ContainerClient,
}

impl SqliteAdapter {
    pub fn new(runtime: &str, settings: &EngineSettings, timeouts: TimeoutConfig) -> Self {
        let exec = ContainerExec::new(runtime, &settings.container);

        let query_argv = vec![
            settings.client.clone(),
            "-batch".to_string(),
            "-noheader".to_string(),
            settings.database.clone(),
        ];
        let script_argv = vec![
            settings.client.clone(),
            "-batch".to_string(),
            settings.database.clone(),
        ];

        Self {
            client: ContainerClient {
                exec,
                query_argv,
                script_argv,
                timeouts,
                unreachable: UNREACHABLE,
            },
        }
    }
}

impl EngineAdapter for SqliteAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    fn transport(&self) -> String {
        self.client.describe()
    }

    async fn execute(&self, sql: &str) -> Result<CommandOutput> {
        self.client.script(sql).await
    }

    async fn scalar(&self, sql: &str) -> Reading {
        self.client.query(sql).await
    }

    fn table_exists_sql(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = {};",
            quote_literal(table)
        )
    }

    fn column_exists_sql(&self, table: &str, column: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM pragma_table_info({}) WHERE name = {};",
            quote_literal(table),
            quote_literal(column)
        )
    }

    fn index_exists_sql(&self, index: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = {};",
            quote_literal(index)
        )
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {};", quote_ident(table))
    }

    fn drop_guard(&self) -> (Option<&'static str>, Option<&'static str>) {
        (
            Some("PRAGMA foreign_keys = OFF;"),
            Some("PRAGMA foreign_keys = ON;"),
        )
    }
}
