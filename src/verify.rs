//! Baseline (pre-migration) and result (post-migration) verifiers.
//!
//! A flat battery of independent checks. No check short-circuits another:
//! when the migration is half-applied every missing piece shows up as its
//! own line.

use anyhow::Result;

use crate::client::CommandOutput;
use crate::engine::{EngineAdapter, Reading};
use crate::expectations::Expectations;
use crate::fixtures::SEED_USER_ID;
use crate::report::{Assertion, Scenario, TestRun};
use crate::sql::quote_literal;

pub fn count_rows_sql(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {};", table)
}

pub fn count_named_sql(table: &str, name: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE name = {};",
        table,
        quote_literal(name)
    )
}

/// Exact count; a missing/empty answer reads as 0.
pub fn expect_count(run: &mut TestRun, description: impl Into<String>, reading: Reading, expected: i64) {
    let description = description.into();
    let assertion = match (&reading, reading.count()) {
        (_, Some(n)) => Assertion::check(description, expected.to_string(), n.to_string(), n == expected),
        (Reading::Value(v), None) => Assertion::check(description, expected.to_string(), v.clone(), false),
        (Reading::Unavailable(reason), None) => {
            Assertion::error(description, expected.to_string(), reason.clone())
        }
    };
    run.push(assertion);
}

pub fn expect_at_least(run: &mut TestRun, description: impl Into<String>, reading: Reading, minimum: i64) {
    let description = description.into();
    let expected = format!(">= {}", minimum);
    let assertion = match (&reading, reading.count()) {
        (_, Some(n)) => Assertion::check(description, expected, n.to_string(), n >= minimum),
        (Reading::Value(v), None) => Assertion::check(description, expected, v.clone(), false),
        (Reading::Unavailable(reason), None) => Assertion::error(description, expected, reason.clone()),
    };
    run.push(assertion);
}

/// Existence flag (`"1"` / `"0"`) compared to `expected`.
pub fn expect_flag(run: &mut TestRun, description: impl Into<String>, reading: Reading, expected: bool) {
    let description = description.into();
    let wanted = if expected { "1" } else { "0" };
    let assertion = match reading {
        Reading::Value(v) => {
            let passed = v == wanted;
            Assertion::check(description, wanted, v, passed)
        }
        Reading::Unavailable(reason) => Assertion::error(description, wanted, reason),
    };
    run.push(assertion);
}

pub fn expect_value(run: &mut TestRun, description: impl Into<String>, reading: Reading, expected: &str) {
    let description = description.into();
    let assertion = match reading {
        Reading::Value(v) => {
            let passed = v == expected;
            Assertion::check(description, expected, v, passed)
        }
        Reading::Unavailable(reason) => Assertion::error(description, expected, reason),
    };
    run.push(assertion);
}

/// A setup step (schema load, fixture insert) ran cleanly: zero exit and
/// no client error lines.
pub fn expect_success(run: &mut TestRun, description: impl Into<String>, result: &Result<CommandOutput>) {
    let description = description.into();
    let assertion = match result {
        Ok(out) => match out.problem() {
            None => Assertion::check(description, "success", "success", true),
            Some(problem) => Assertion::check(description, "success", problem, false),
        },
        Err(e) => Assertion::error(description, "success", format!("{e:#}")),
    };
    run.push(assertion);
}

/// Sanity-check the historical state before migrating.
pub async fn verify_baseline<A: EngineAdapter>(
    adapter: &A,
    expectations: &Expectations,
    scenario: Scenario,
    run: &mut TestRun,
) {
    let e = expectations;

    expect_count(
        run,
        "baseline: perm_items count",
        adapter.scalar(&count_rows_sql("perm_items")).await,
        e.perm_items_before,
    );
    expect_count(
        run,
        "baseline: perm_templ count",
        adapter.scalar(&count_rows_sql("perm_templ")).await,
        e.perm_templ_before,
    );
    expect_flag(
        run,
        format!(
            "baseline: column {}.{} absent",
            e.new_column_table, e.new_column
        ),
        adapter.column_exists(&e.new_column_table, &e.new_column).await,
        false,
    );

    if scenario.has_fixture_data() {
        expect_count(
            run,
            "baseline: users count",
            adapter.scalar(&count_rows_sql("users")).await,
            1,
        );
    }
}

/// Assert the post-migration shape and, with data, that nothing was lost.
pub async fn verify_result<A: EngineAdapter>(
    adapter: &A,
    expectations: &Expectations,
    scenario: Scenario,
    run: &mut TestRun,
) {
    let e = expectations;

    // Structure
    for table in &e.new_tables {
        expect_flag(
            run,
            format!("table {} exists", table),
            adapter.table_exists(table).await,
            true,
        );
    }
    expect_flag(
        run,
        format!("column {}.{} exists", e.new_column_table, e.new_column),
        adapter.column_exists(&e.new_column_table, &e.new_column).await,
        true,
    );

    // Reference data
    expect_count(
        run,
        "perm_items count",
        adapter.scalar(&count_rows_sql("perm_items")).await,
        e.perm_items_after,
    );
    for permission in &e.new_permissions {
        expect_at_least(
            run,
            format!("permission {} exists", permission),
            adapter.scalar(&count_named_sql("perm_items", permission)).await,
            1,
        );
    }
    expect_count(
        run,
        "perm_templ count",
        adapter.scalar(&count_rows_sql("perm_templ")).await,
        e.perm_templ_after,
    );
    for template in &e.new_templates {
        expect_at_least(
            run,
            format!("template '{}' exists", template),
            adapter.scalar(&count_named_sql("perm_templ", template)).await,
            1,
        );
    }

    // Indexes
    for index in &e.indexes {
        expect_flag(
            run,
            format!("index {} exists", index),
            adapter.index_exists(index).await,
            true,
        );
    }

    if !scenario.has_fixture_data() {
        return;
    }

    // Data preservation
    expect_at_least(
        run,
        format!("user {} preserved", SEED_USER_ID),
        adapter
            .scalar(&format!(
                "SELECT COUNT(*) FROM users WHERE id = {};",
                SEED_USER_ID
            ))
            .await,
        1,
    );
    expect_value(
        run,
        format!(
            "{}.{} of user {}",
            e.new_column_table, e.new_column, SEED_USER_ID
        ),
        adapter
            .scalar(&format!(
                "SELECT {} FROM {} WHERE id = {};",
                e.new_column, e.new_column_table, SEED_USER_ID
            ))
            .await,
        &e.new_column_default,
    );
    expect_at_least(
        run,
        format!(
            "perm_templ_items mapping ({}, {}) preserved",
            e.admin_templ_id, e.admin_perm_id
        ),
        adapter
            .scalar(&format!(
                "SELECT COUNT(*) FROM perm_templ_items WHERE templ_id = {} AND perm_id = {};",
                e.admin_templ_id, e.admin_perm_id
            ))
            .await,
        1,
    );
}
