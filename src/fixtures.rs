//! Baseline data for the with-data scenario: one administrative user.

use anyhow::Result;

use crate::client::CommandOutput;
use crate::engine::EngineAdapter;

pub const SEED_USER_ID: i64 = 1;

/// bcrypt hash of "poweradmin"
const SEED_PASSWORD_HASH: &str = "$2y$12$7xGIuX8AdOkDWIxUAz0Ie.Xr9S4SvmR9UDvCBa8eWx5cqnlTS/aS2";

pub fn seed_user_sql() -> String {
    format!(
        "INSERT INTO users (id, username, password, fullname, email, description, perm_templ, active, use_ldap) \
         VALUES ({}, 'admin', '{}', 'Administrator', 'admin@example.com', 'Administrator with full rights.', 1, 1, 0);",
        SEED_USER_ID, SEED_PASSWORD_HASH
    )
}

pub fn seed_script<A: EngineAdapter>(adapter: &A) -> String {
    let mut script = seed_user_sql();
    if let Some(resync) = adapter.resync_user_sequence_sql() {
        script.push('\n');
        script.push_str(&resync);
    }
    script.push('\n');
    script
}

/// Insert the fixture user. Each scenario starts from a freshly reloaded
/// schema, so this is not idempotent.
pub async fn seed<A: EngineAdapter>(adapter: &A) -> Result<CommandOutput> {
    adapter.execute(&seed_script(adapter)).await
}
