//! Assertion log and aggregate result.
//!
//! Every check the harness performs becomes one [`Assertion`] appended to
//! the [`TestRun`] of its engine and scenario. Runs are recorded into the
//! [`AggregateResult`] in order; counts, the failure list and the exit code
//! are all derived from that log rather than kept as running totals.

use serde::Serialize;
use std::fmt;

use crate::engine::EngineKind;
use crate::exit_codes;

pub const REPORT_SCHEMA_ID: &str = "migverify.report";
pub const REPORT_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    Empty,
    WithData,
}

impl Scenario {
    pub const ALL: [Scenario; 2] = [Scenario::Empty, Scenario::WithData];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::Empty => "empty",
            Scenario::WithData => "with-data",
        }
    }

    pub fn has_fixture_data(self) -> bool {
        self == Scenario::WithData
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionStatus {
    Pass,
    Fail,
    /// The actual value could not be obtained
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assertion {
    pub description: String,
    pub expected: String,
    pub actual: String,
    pub status: AssertionStatus,
}

impl Assertion {
    pub fn check(
        description: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
        passed: bool,
    ) -> Self {
        Self {
            description: description.into(),
            expected: expected.into(),
            actual: actual.into(),
            status: if passed {
                AssertionStatus::Pass
            } else {
                AssertionStatus::Fail
            },
        }
    }

    pub fn error(
        description: impl Into<String>,
        expected: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            expected: expected.into(),
            actual: reason.into(),
            status: AssertionStatus::Error,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == AssertionStatus::Pass
    }

    /// "description: expected X, got Y" (or "could not evaluate: reason")
    pub fn detail(&self) -> String {
        match self.status {
            AssertionStatus::Pass => self.description.clone(),
            AssertionStatus::Fail => format!(
                "{}: expected {}, got {}",
                self.description,
                self.expected,
                display_value(&self.actual)
            ),
            AssertionStatus::Error => {
                format!("{}: could not evaluate ({})", self.description, self.actual)
            }
        }
    }
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(empty)"
    } else {
        value
    }
}

/// Assertions for one engine × scenario, or one engine's preflight.
#[derive(Debug, Clone, Serialize)]
pub struct TestRun {
    pub engine: EngineKind,
    /// `None` for the preflight checks
    pub scenario: Option<Scenario>,
    pub assertions: Vec<Assertion>,
}

impl TestRun {
    pub fn new(engine: EngineKind, scenario: Scenario) -> Self {
        Self {
            engine,
            scenario: Some(scenario),
            assertions: Vec::new(),
        }
    }

    pub fn preflight(engine: EngineKind) -> Self {
        Self {
            engine,
            scenario: None,
            assertions: Vec::new(),
        }
    }

    pub fn push(&mut self, assertion: Assertion) {
        self.assertions.push(assertion);
    }

    pub fn label(&self) -> String {
        match self.scenario {
            Some(s) => format!("{}/{}", self.engine, s),
            None => format!("{}/preflight", self.engine),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.assertions.iter().all(Assertion::passed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.pass + self.fail + self.error
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    runs: Vec<TestRun>,
    warnings: Vec<String>,
}

impl AggregateResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, run: TestRun) {
        self.runs.push(run);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn runs(&self) -> &[TestRun] {
        &self.runs
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for assertion in self.runs.iter().flat_map(|r| r.assertions.iter()) {
            match assertion.status {
                AssertionStatus::Pass => summary.pass += 1,
                AssertionStatus::Fail => summary.fail += 1,
                AssertionStatus::Error => summary.error += 1,
            }
        }
        summary
    }

    /// "<engine>/<scenario>: <detail>" for every non-passing assertion, in order.
    pub fn failures(&self) -> Vec<String> {
        self.runs
            .iter()
            .flat_map(|run| {
                let label = run.label();
                run.assertions
                    .iter()
                    .filter(|a| !a.passed())
                    .map(move |a| format!("{}: {}", label, a.detail()))
            })
            .collect()
    }

    pub fn exit_code(&self) -> i32 {
        let summary = self.summary();
        if summary.fail + summary.error > 0 {
            exit_codes::FAILED
        } else {
            exit_codes::PASSED
        }
    }

    pub fn format_summary(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();

        out.push_str(&format!(
            "Results: {} passed, {} failed, {} could not be evaluated ({} total)\n",
            summary.pass,
            summary.fail,
            summary.error,
            summary.total()
        ));

        if !self.warnings.is_empty() {
            out.push_str(&format!("Warnings: {}\n", self.warnings.len()));
        }

        let failures = self.failures();
        if failures.is_empty() {
            out.push_str("All assertions passed.\n");
        } else {
            out.push_str("\nFailures:\n");
            for (i, failure) in failures.iter().enumerate() {
                out.push_str(&format!("  {}. {}\n", i + 1, failure));
            }
        }
        out
    }

    pub fn to_json(&self, generated_at: impl Into<String>) -> ReportJson {
        let exit_code = self.exit_code();
        ReportJson {
            ok: exit_code == exit_codes::PASSED,
            schema_id: REPORT_SCHEMA_ID,
            schema_version: REPORT_SCHEMA_VERSION,
            tool_version: env!("CARGO_PKG_VERSION"),
            generated_at: generated_at.into(),
            exit_code,
            summary: self.summary(),
            runs: self.runs.clone(),
            failures: self.failures(),
            warnings: self.warnings.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportJson {
    pub ok: bool,
    pub schema_id: &'static str,
    pub schema_version: &'static str,
    pub tool_version: &'static str,
    pub generated_at: String,
    pub exit_code: i32,
    pub summary: Summary,
    pub runs: Vec<TestRun>,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
}
