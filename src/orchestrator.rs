//! Test orchestrator.
//!
//! Preflight → ExtractSchemas → for each engine: {empty, with-data} ×
//! (load → seed → baseline → migrate → verify) → Restore → Import.
//!
//! Only a missing tag (or an invalid drop list) aborts the run. Every other
//! problem becomes an assertion or a warning and the run carries on, so a
//! single invocation reports as much as it can.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use crate::config::Config;
use crate::engine::{AnyAdapter, EngineAdapter, EngineKind};
use crate::expectations::Expectations;
use crate::output::Output;
use crate::report::{AggregateResult, Assertion, Scenario, TestRun};
use crate::timeouts::TimeoutConfig;
use crate::vcs::GitRepo;
use crate::{fixtures, migration, schema, verify};

/// Everything one engine needs, resolved before its first scenario.
/// Read failures are kept as messages so they surface inside the runs.
pub struct EnginePlan {
    pub kind: EngineKind,
    pub historical_schema: std::result::Result<String, String>,
    pub migration: std::result::Result<String, String>,
    pub current_schema: std::result::Result<String, String>,
}

pub struct Harness<'a> {
    pub expectations: &'a Expectations,
    pub drop_tables: Vec<String>,
    pub output: &'a Output,
}

impl<'a> Harness<'a> {
    /// Migration file present and container answering. Non-fatal.
    pub async fn preflight<A: EngineAdapter>(&self, adapter: &A, migration_path: &Path) -> TestRun {
        let mut run = TestRun::preflight(adapter.kind());

        let present = migration_path.is_file();
        run.push(Assertion::check(
            format!("migration script {} present", migration_path.display()),
            "present",
            if present { "present" } else { "missing" },
            present,
        ));
        verify::expect_value(
            &mut run,
            "container reachable",
            adapter.scalar("SELECT 1;").await,
            "1",
        );

        self.emit(&run, 0);
        run
    }

    /// Both scenarios, then restore. Restore is not conditional on results.
    pub async fn run_engine<A: EngineAdapter>(
        &self,
        adapter: &A,
        plan: &EnginePlan,
        results: &mut AggregateResult,
    ) {
        for scenario in Scenario::ALL {
            let run = self.run_scenario(adapter, plan, scenario, results).await;
            results.record(run);
        }
        self.restore(adapter, plan, results).await;
    }

    async fn run_scenario<A: EngineAdapter>(
        &self,
        adapter: &A,
        plan: &EnginePlan,
        scenario: Scenario,
        results: &mut AggregateResult,
    ) -> TestRun {
        let mut run = TestRun::new(plan.kind, scenario);
        let label = run.label();
        self.output
            .heading(&format!("{} / {}", plan.kind.label(), scenario));

        self.output.info("Loading historical schema...");
        match &plan.historical_schema {
            Ok(sql) => {
                let loaded = schema::load_schema(adapter, &self.drop_tables, sql).await;
                self.log_client_output(&loaded);
                verify::expect_success(&mut run, "historical schema loaded", &loaded);
            }
            Err(reason) => run.push(Assertion::error(
                "historical schema loaded",
                "success",
                reason.clone(),
            )),
        }
        let mut shown = self.emit(&run, 0);

        if scenario.has_fixture_data() {
            self.output.info("Seeding fixture user...");
            let seeded = fixtures::seed(adapter).await;
            self.log_client_output(&seeded);
            verify::expect_success(&mut run, "fixture user seeded", &seeded);
            shown = self.emit(&run, shown);
        }

        self.output.info("Checking pre-migration state...");
        verify::verify_baseline(adapter, self.expectations, scenario, &mut run).await;
        shown = self.emit(&run, shown);

        self.output.info("Applying migration...");
        match &plan.migration {
            Ok(sql) => self.apply_migration(adapter, sql, &label, results).await,
            Err(reason) => self.warn(
                results,
                format!("{}: migration script unavailable ({}); skipped", label, reason),
            ),
        }

        self.output.info("Verifying migrated state...");
        verify::verify_result(adapter, self.expectations, scenario, &mut run).await;
        self.emit(&run, shown);

        run
    }

    /// Client errors during the migration are diagnostics, not failures.
    async fn apply_migration<A: EngineAdapter>(
        &self,
        adapter: &A,
        sql: &str,
        label: &str,
        results: &mut AggregateResult,
    ) {
        match migration::apply_migration(adapter, sql).await {
            Ok(out) => {
                self.output.verbose(&out.combined());
                let errors = out.error_lines();
                for line in &errors {
                    self.warn(results, format!("{}: migration reported: {}", label, line));
                }
                if !out.success() && errors.is_empty() {
                    self.warn(
                        results,
                        format!("{}: migration client {}", label, out.failure_reason()),
                    );
                }
            }
            Err(e) => self.warn(results, format!("{}: could not run migration: {e:#}", label)),
        }
    }

    /// Put the current schema back so other tooling finds a working database.
    pub async fn restore<A: EngineAdapter>(
        &self,
        adapter: &A,
        plan: &EnginePlan,
        results: &mut AggregateResult,
    ) {
        self.output
            .heading(&format!("{}: restoring current schema", plan.kind.label()));

        let current = match &plan.current_schema {
            Ok(sql) => sql,
            Err(reason) => {
                self.warn(
                    results,
                    format!("{}: current schema unavailable ({}); database left migrated", plan.kind, reason),
                );
                return;
            }
        };

        match schema::load_schema(adapter, &self.drop_tables, current).await {
            Ok(out) => match out.problem() {
                None => self.output.info("Current schema restored"),
                Some(problem) => {
                    self.output.verbose(&out.combined());
                    self.warn(
                        results,
                        format!("{}: restore reported {}", plan.kind, problem),
                    );
                }
            },
            Err(e) => self.warn(results, format!("{}: restore failed: {e:#}", plan.kind)),
        }
    }

    /// Print assertions recorded since `from`; returns the new high-water mark.
    fn emit(&self, run: &TestRun, from: usize) -> usize {
        let label = run.label();
        for assertion in &run.assertions[from..] {
            self.output.assertion(&label, assertion);
        }
        run.assertions.len()
    }

    fn log_client_output(&self, result: &Result<crate::client::CommandOutput>) {
        if let Ok(out) = result {
            let text = out.combined();
            if !text.is_empty() {
                self.output.verbose(&text);
            }
        }
    }

    fn warn(&self, results: &mut AggregateResult, message: String) {
        self.output.warn(&message);
        results.warn(message);
    }
}

/// Run the whole protocol for `engines`.
pub async fn run(
    config: &Config,
    engines: &[EngineKind],
    timeouts: TimeoutConfig,
    output: &Output,
) -> Result<AggregateResult> {
    let repo = GitRepo::new(config.repo_root());
    let tag = config.tag();

    if !repo.tag_exists(&tag).await? {
        bail!(
            "Tag '{}' not found in {}. Run `git fetch --tags` or set MIGVERIFY_TAG.",
            tag,
            repo.root().display()
        );
    }

    let drop_tables =
        schema::drop_targets(&config.expectations.new_tables, &config.extra_drop_tables())?;
    let runtime = config.container_runtime();
    let harness = Harness {
        expectations: &config.expectations,
        drop_tables,
        output,
    };
    let mut results = AggregateResult::new();

    output.heading("Preflight");
    output.info(&format!("Historical schema tag: {}", tag));
    let mut prepared = Vec::new();
    for &kind in engines {
        let settings = config.engine_settings(kind);
        let adapter = AnyAdapter::new(kind, &runtime, &settings, timeouts);
        output.verbose(&format!("{}: {}", kind, adapter.transport()));

        let migration_path = repo.root().join(&settings.migration_path);
        results.record(harness.preflight(&adapter, &migration_path).await);
        prepared.push((adapter, settings));
    }

    output.heading("Extracting historical schemas");
    let mut plans = Vec::new();
    for (adapter, settings) in prepared {
        let kind = adapter.kind();
        let historical_schema = repo
            .show(&tag, &settings.schema_path)
            .await
            .map_err(|e| format!("{e:#}"));
        match &historical_schema {
            Ok(sql) => output.info(&format!(
                "{}: {}:{} ({} bytes)",
                kind,
                tag,
                settings.schema_path,
                sql.len()
            )),
            Err(reason) => output.warn(&format!("{}: {}", kind, reason)),
        }

        let plan = EnginePlan {
            kind,
            historical_schema,
            migration: read_text(&repo.root().join(&settings.migration_path)),
            current_schema: read_text(&repo.root().join(&settings.schema_path)),
        };
        plans.push((adapter, plan));
    }

    for (adapter, plan) in &plans {
        harness.run_engine(adapter, plan, &mut results).await;
    }

    run_importer(
        &config.importer_path(),
        &config.repo_root(),
        timeouts.script_timeout,
        output,
        &mut results,
    )
    .await;

    Ok(results)
}

fn read_text(path: &Path) -> std::result::Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Repopulate development fixtures. Absence or failure is only a warning.
async fn run_importer(
    script: &Path,
    root: &Path,
    timeout: Duration,
    output: &Output,
    results: &mut AggregateResult,
) {
    let script: PathBuf = match script.canonicalize() {
        Ok(path) if path.is_file() => path,
        _ => {
            let message = format!(
                "test-data importer not found at {}; skipped",
                script.display()
            );
            output.warn(&message);
            results.warn(message);
            return;
        }
    };

    output.heading("Importing test data");
    let child = Command::new("bash")
        .arg(&script)
        .current_dir(root)
        .kill_on_drop(true)
        .output();

    let problem = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(out)) if out.status.success() => {
            output.info("Test data imported");
            None
        }
        Ok(Ok(out)) => Some(format!(
            "test-data importer exited with code {}: {}",
            out.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&out.stderr).trim()
        )),
        Ok(Err(e)) => Some(format!("failed to run test-data importer: {}", e)),
        Err(_) => Some(format!("test-data importer timed out after {:?}", timeout)),
    };

    if let Some(message) = problem {
        output.warn(&message);
        results.warn(message);
    }
}
