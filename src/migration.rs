//! Migration runner.
//!
//! The script runs once, end to end, with no retries. Statements that fail
//! do not stop it. Whether the migration worked is decided afterwards from
//! the final database state, so errors here are only diagnostics (see
//! [`CommandOutput::error_lines`]).

use anyhow::Result;

use crate::client::CommandOutput;
use crate::engine::EngineAdapter;

pub async fn apply_migration<A: EngineAdapter>(adapter: &A, sql: &str) -> Result<CommandOutput> {
    adapter.execute(sql).await
}
