//! Schema loader: drop the application's own tables and reload a snapshot.
//!
//! PowerDNS owns part of the same database (`domains`, `records`, ...).
//! Those tables are never drop targets; [`drop_targets`] refuses any list
//! that names one.

use anyhow::{bail, Result};

use crate::client::CommandOutput;
use crate::engine::EngineAdapter;

/// Tables created by the application's own schema files.
pub const APP_TABLES: &[&str] = &[
    "users",
    "perm_items",
    "perm_templ",
    "perm_templ_items",
    "zones",
    "zone_templ",
    "zone_templ_records",
    "records_zone_templ",
    "migrations",
    "log_users",
    "log_zones",
    "login_attempts",
    "api_keys",
    "user_mfa",
    "user_preferences",
    "zone_template_sync",
    "password_reset_tokens",
    "username_recovery_requests",
];

/// Tables owned by the PowerDNS server.
pub const PDNS_TABLES: &[&str] = &[
    "domains",
    "records",
    "supermasters",
    "comments",
    "domainmetadata",
    "cryptokeys",
    "tsigkeys",
];

pub fn is_pdns_table(name: &str) -> bool {
    PDNS_TABLES.iter().any(|t| t.eq_ignore_ascii_case(name))
}

/// Application tables plus the migration's new tables plus configured
/// extras, de-duplicated in first-seen order.
pub fn drop_targets(new_tables: &[String], extra: &[String]) -> Result<Vec<String>> {
    let mut targets: Vec<String> = Vec::new();
    let candidates = APP_TABLES
        .iter()
        .map(|t| t.to_string())
        .chain(new_tables.iter().cloned())
        .chain(extra.iter().cloned());

    for table in candidates {
        if is_pdns_table(&table) {
            bail!(
                "Refusing to drop '{}': it belongs to PowerDNS, not the application",
                table
            );
        }
        if !targets.iter().any(|t| t == &table) {
            targets.push(table);
        }
    }
    Ok(targets)
}

/// The full reload script: guarded drops, sequence drops, then the schema.
pub fn reload_script<A: EngineAdapter>(adapter: &A, tables: &[String], schema_sql: &str) -> String {
    let (before, after) = adapter.drop_guard();
    let mut statements: Vec<String> = Vec::new();

    if let Some(stmt) = before {
        statements.push(stmt.to_string());
    }
    statements.extend(tables.iter().map(|t| adapter.drop_table_sql(t)));
    statements.extend(adapter.drop_sequences_sql(tables));
    if let Some(stmt) = after {
        statements.push(stmt.to_string());
    }

    let mut script = statements.join("\n");
    script.push_str("\n\n");
    script.push_str(schema_sql);
    if !script.ends_with('\n') {
        script.push('\n');
    }
    script
}

/// Drop `tables` and load `schema_sql` in a single client session.
pub async fn load_schema<A: EngineAdapter>(
    adapter: &A,
    tables: &[String],
    schema_sql: &str,
) -> Result<CommandOutput> {
    adapter
        .execute(&reload_script(adapter, tables, schema_sql))
        .await
}
