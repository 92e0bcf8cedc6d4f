//! PostgreSQL adapter.

use anyhow::Result;

use super::{ContainerClient, EngineAdapter, EngineKind, Reading};
use crate::client::{CommandOutput, ContainerExec, UnreachableSignals};
use crate::config::EngineSettings;
use crate::sql::{quote_ident, quote_literal};
use crate::timeouts::TimeoutConfig;

/// psql exits 2 when the connection is bad; exit 1 and 3 are script errors.
const UNREACHABLE: UnreachableSignals = UnreachableSignals {
    exit_codes: &[2],
    stderr_markers: &["could not connect", "connection to server", "FATAL:"],
};

pub struct PgsqlAdapter {
    client: ContainerClient,
}

impl PgsqlAdapter {
    pub fn new(runtime: &str, settings: &EngineSettings, timeouts: TimeoutConfig) -> Self {
        let exec = ContainerExec::new(runtime, &settings.container)
            .with_env("PGPASSWORD", &settings.password);

        // -X: ignore ~/.psqlrc inside the container
        let base = vec![
            settings.client.clone(),
            "-X".to_string(),
            "-q".to_string(),
            "-U".to_string(),
            settings.user.clone(),
            "-d".to_string(),
            settings.database.clone(),
        ];

        let mut query_argv = base.clone();
        query_argv.extend(["-t".to_string(), "-A".to_string()]);

        // psql continues past failing statements unless ON_ERROR_STOP is set
        let mut script_argv = base;
        script_argv.extend(["-v".to_string(), "ON_ERROR_STOP=0".to_string()]);

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

impl EngineAdapter for PgsqlAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Pgsql
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
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_name = {};",
            quote_literal(table)
        )
    }

    fn column_exists_sql(&self, table: &str, column: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = {} AND column_name = {};",
            quote_literal(table),
            quote_literal(column)
        )
    }

    fn index_exists_sql(&self, index: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM pg_indexes WHERE schemaname = 'public' AND indexname = {};",
            quote_literal(index)
        )
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {} CASCADE;", quote_ident(table))
    }

    /// The historical schema recreates `<table>_id_seq` itself, so stale
    /// sequences left behind by a previous run must go first.
    fn drop_sequences_sql(&self, tables: &[String]) -> Vec<String> {
        tables
            .iter()
            .map(|t| {
                format!(
                    "DROP SEQUENCE IF EXISTS {} CASCADE;",
                    quote_ident(&format!("{}_id_seq", t))
                )
            })
            .collect()
    }

    fn resync_user_sequence_sql(&self) -> Option<String> {
        Some("SELECT setval('users_id_seq', (SELECT MAX(id) FROM users));".to_string())
    }
}
