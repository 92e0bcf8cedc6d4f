//! MySQL / MariaDB adapter.

use anyhow::Result;

use super::{ContainerClient, EngineAdapter, EngineKind, Reading};
use crate::client::{CommandOutput, ContainerExec, UnreachableSignals};
use crate::config::EngineSettings;
use crate::sql::{quote_backtick, quote_literal};
use crate::timeouts::TimeoutConfig;

/// Connection-level client errors (2002 socket, 2003 TCP, 2005 host,
/// 2006/2013 server gone) and a refused login or missing database.
const UNREACHABLE: UnreachableSignals = UnreachableSignals {
    exit_codes: &[],
    stderr_markers: &[
        "ERROR 2002",
        "ERROR 2003",
        "ERROR 2005",
        "ERROR 2006",
        "ERROR 2013",
        "ERROR 1045",
        "ERROR 1049",
    ],
};

pub struct MysqlAdapter {
    client: ContainerClient,
}

impl MysqlAdapter {
    pub fn new(runtime: &str, settings: &EngineSettings, timeouts: TimeoutConfig) -> Self {
        // MYSQL_PWD keeps the password off the client's command line
        let exec = ContainerExec::new(runtime, &settings.container)
            .with_env("MYSQL_PWD", &settings.password);

        let base = vec![
            settings.client.clone(),
            format!("--user={}", settings.user),
        ];

        let mut query_argv = base.clone();
        query_argv.extend(["--batch".to_string(), "--skip-column-names".to_string()]);
        query_argv.push(settings.database.clone());

        // --force: keep going after a failing statement
        let mut script_argv = base;
        script_argv.push("--force".to_string());
        script_argv.push(settings.database.clone());

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

impl EngineAdapter for MysqlAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Mysql
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
             WHERE table_schema = DATABASE() AND table_name = {};",
            quote_literal(table)
        )
    }

    fn column_exists_sql(&self, table: &str, column: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = {} AND column_name = {};",
            quote_literal(table),
            quote_literal(column)
        )
    }

    fn index_exists_sql(&self, index: &str) -> String {
        format!(
            "SELECT COUNT(DISTINCT index_name) FROM information_schema.statistics \
             WHERE table_schema = DATABASE() AND index_name = {};",
            quote_literal(index)
        )
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {};", quote_backtick(table))
    }

    fn drop_guard(&self) -> (Option<&'static str>, Option<&'static str>) {
        (
            Some("SET FOREIGN_KEY_CHECKS = 0;"),
            Some("SET FOREIGN_KEY_CHECKS = 1;"),
        )
    }
}
