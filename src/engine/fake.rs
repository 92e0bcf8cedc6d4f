//! In-memory stand-in for a database container, for unit tests.
//!
//! Understands the statements the harness itself produces: table drops,
//! the fixture insert, the verifier queries, and three marker comments
//! (`-- historical`, `-- migrate`, `-- current`) that stand in for whole
//! schema and migration files.

use anyhow::Result;
use std::cell::RefCell;
use std::collections::BTreeSet;

use super::{EngineAdapter, EngineKind, Reading};
use crate::client::CommandOutput;
use crate::expectations::Expectations;
use crate::schema::APP_TABLES;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FakeState {
    pub tables: BTreeSet<String>,
    pub columns: BTreeSet<(String, String)>,
    pub indexes: BTreeSet<String>,
    pub permissions: Vec<String>,
    pub templates: Vec<String>,
    pub users: i64,
    pub auth_method: Option<String>,
    pub admin_mapping: bool,
    pub restored: bool,
}

pub(crate) struct FakeAdapter {
    kind: EngineKind,
    state: RefCell<FakeState>,
    executed: RefCell<Vec<String>>,
    dropped: RefCell<Vec<String>>,
    reachable: bool,
    migration_works: bool,
    script_stderr: String,
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self::with_state(FakeState::default())
    }

    pub fn with_state(state: FakeState) -> Self {
        Self {
            kind: EngineKind::Sqlite,
            state: RefCell::new(state),
            executed: RefCell::new(Vec::new()),
            dropped: RefCell::new(Vec::new()),
            reachable: true,
            migration_works: true,
            script_stderr: String::new(),
        }
    }

    pub fn kind_of(mut self, kind: EngineKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Migration script runs but changes nothing.
    pub fn broken_migration(mut self) -> Self {
        self.migration_works = false;
        self
    }

    /// Every script exits 0 but prints `stderr`, like psql without ON_ERROR_STOP.
    pub fn script_stderr(mut self, stderr: &str) -> Self {
        self.script_stderr = stderr.to_string();
        self
    }

    pub fn state(&self) -> FakeState {
        self.state.borrow().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }

    pub fn dropped(&self) -> Vec<String> {
        self.dropped.borrow().clone()
    }

    fn load_historical(state: &mut FakeState) {
        let e = Expectations::default();
        state.tables.extend(APP_TABLES.iter().map(|t| t.to_string()));
        state
            .columns
            .remove(&(e.new_column_table.clone(), e.new_column.clone()));
        for index in &e.indexes {
            state.indexes.remove(index);
        }
        state.permissions = (0..e.perm_items_before)
            .map(|i| format!("perm_{}", i))
            .collect();
        state.templates = vec!["Administrator".to_string()];
        state.users = 0;
        state.auth_method = None;
        state.admin_mapping = true;
    }

    fn migrate(state: &mut FakeState) {
        let e = Expectations::default();
        state.tables.extend(e.new_tables.iter().cloned());
        state.columns.insert((e.new_column_table, e.new_column));
        state.indexes.extend(e.indexes.iter().cloned());
        state.permissions.extend(e.new_permissions.iter().cloned());
        state.templates.extend(e.new_templates.iter().cloned());
        if state.users > 0 {
            state.auth_method = Some(e.new_column_default);
        }
    }
}

fn quoted_name(sql: &str) -> Option<&str> {
    let start = sql.find("name = '")? + "name = '".len();
    let len = sql[start..].find('\'')?;
    Some(&sql[start..start + len])
}

fn flag(b: bool) -> Reading {
    Reading::Value(if b { "1" } else { "0" }.to_string())
}

fn count(n: usize) -> Reading {
    Reading::Value(n.to_string())
}

impl EngineAdapter for FakeAdapter {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn transport(&self) -> String {
        "fake".to_string()
    }

    async fn execute(&self, sql: &str) -> Result<CommandOutput> {
        if !self.reachable {
            anyhow::bail!("Failed to execute docker");
        }
        self.executed.borrow_mut().push(sql.to_string());

        let mut state = self.state.borrow_mut();
        for line in sql.lines() {
            if let Some(rest) = line.strip_prefix("DROP TABLE IF EXISTS ") {
                let table = rest.trim_end_matches(';').to_string();
                state.tables.remove(&table);
                state.columns.retain(|(t, _)| t != &table);
                self.dropped.borrow_mut().push(table);
            }
        }
        if sql.contains("-- historical") {
            Self::load_historical(&mut state);
            state.restored = false;
        }
        if sql.contains("-- current") {
            Self::load_historical(&mut state);
            Self::migrate(&mut state);
            state.restored = true;
        }
        if sql.contains("INSERT INTO users") && state.tables.contains("users") {
            state.users += 1;
        }
        if sql.contains("-- migrate") && self.migration_works {
            Self::migrate(&mut state);
        }

        Ok(CommandOutput {
            stderr: self.script_stderr.clone(),
            exit_code: Some(0),
            ..CommandOutput::default()
        })
    }

    async fn scalar(&self, sql: &str) -> Reading {
        if !self.reachable {
            return Reading::Unavailable("connection refused".to_string());
        }
        let state = self.state.borrow();
        let has = |t: &str| state.tables.contains(t);

        if let Some(t) = sql.strip_prefix("table:") {
            return flag(has(t));
        }
        if let Some(rest) = sql.strip_prefix("column:") {
            let (t, c) = rest.split_once('.').unwrap_or((rest, ""));
            return flag(state.columns.contains(&(t.to_string(), c.to_string())));
        }
        if let Some(i) = sql.strip_prefix("index:") {
            return flag(state.indexes.contains(i));
        }
        if sql == "SELECT 1;" {
            return Reading::Value("1".to_string());
        }

        if sql.contains("FROM perm_templ_items") {
            return flag(state.admin_mapping && has("perm_templ_items"));
        }
        if sql.contains("FROM perm_items") {
            // A SQL error prints nothing on stdout
            if !has("perm_items") {
                return Reading::Value(String::new());
            }
            return match quoted_name(sql) {
                Some(name) => count(state.permissions.iter().filter(|p| *p == name).count()),
                None => count(state.permissions.len()),
            };
        }
        if sql.contains("FROM perm_templ") {
            return match quoted_name(sql) {
                Some(name) => count(state.templates.iter().filter(|t| *t == name).count()),
                None => count(state.templates.len()),
            };
        }
        if sql.starts_with("SELECT auth_method FROM users") {
            if !state
                .columns
                .contains(&("users".to_string(), "auth_method".to_string()))
            {
                return Reading::Value(String::new());
            }
            return Reading::Value(state.auth_method.clone().unwrap_or_default());
        }
        if sql.contains("FROM users") {
            return Reading::Value(state.users.to_string());
        }

        Reading::Unavailable(format!("unsupported query: {}", sql))
    }

    fn table_exists_sql(&self, table: &str) -> String {
        format!("table:{}", table)
    }

    fn column_exists_sql(&self, table: &str, column: &str) -> String {
        format!("column:{}.{}", table, column)
    }

    fn index_exists_sql(&self, index: &str) -> String {
        format!("index:{}", index)
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {};", table)
    }

    fn drop_guard(&self) -> (Option<&'static str>, Option<&'static str>) {
        (Some("-- GUARD OFF"), Some("-- GUARD ON"))
    }

    fn drop_sequences_sql(&self, tables: &[String]) -> Vec<String> {
        tables
            .iter()
            .map(|t| format!("DROP SEQUENCE IF EXISTS {}_id_seq;", t))
            .collect()
    }
}
