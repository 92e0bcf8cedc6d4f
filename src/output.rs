//! Output layer for migverify.
//!
//! Centralizes stdout/stderr separation and human vs JSON output modes.
//! - stdout: data (the assertion table and summary, or the JSON report)
//! - stderr: diagnostics (progress, warnings, verbose client output)

use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};

use crate::report::{Assertion, AssertionStatus};

/// Output mode for the CLI
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Output helper that centralizes all CLI output
#[derive(Debug, Clone)]
pub struct Output {
    pub mode: OutputMode,
    pub quiet: bool,
    pub verbose: bool,
}

impl Output {
    pub fn new(json: bool, quiet: bool, verbose: bool) -> Self {
        Self {
            mode: if json {
                OutputMode::Json
            } else {
                OutputMode::Human
            },
            quiet,
            verbose,
        }
    }

    /// Human-mode stdout. In JSON mode the report is the only thing on stdout.
    pub fn data(&self, message: &str) {
        if self.mode == OutputMode::Human {
            println!("{}", message);
        }
    }

    pub fn json<T: Serialize>(&self, report: &T) -> Result<(), serde_json::Error> {
        println!("{}", serde_json::to_string_pretty(report)?);
        Ok(())
    }

    /// Progress, headings and warnings go to stderr only in human mode
    /// without --quiet. JSON runs carry warnings inside the report.
    fn chatty(&self) -> bool {
        self.mode == OutputMode::Human && !self.quiet
    }

    pub fn info(&self, message: &str) {
        if self.chatty() {
            eprintln!("{}", message);
        }
    }

    /// Section heading for an engine or scenario
    pub fn heading(&self, message: &str) {
        if self.chatty() {
            eprintln!("\n{}", message.bold());
        }
    }

    /// Client command lines and raw client output (--verbose)
    pub fn verbose(&self, message: &str) {
        if self.chatty() && self.verbose {
            eprintln!("{}", message.dimmed());
        }
    }

    pub fn warn(&self, message: &str) {
        if self.chatty() {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        }
    }

    /// One row of the results table. With --quiet only non-passing rows print.
    pub fn assertion(&self, label: &str, assertion: &Assertion) {
        if self.mode == OutputMode::Json || (self.quiet && assertion.passed()) {
            return;
        }
        let tag = match assertion.status {
            AssertionStatus::Pass => "PASS ".green().bold(),
            AssertionStatus::Fail => "FAIL ".red().bold(),
            AssertionStatus::Error => "ERROR".magenta().bold(),
        };
        println!("  {} {}", tag, format_row(label, assertion));
    }

    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// `process::exit` skips destructors, so flush before calling it.
    pub fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

/// Uncoloured body of a results row: `<label>  <detail>`
pub fn format_row(label: &str, assertion: &Assertion) -> String {
    format!("{:<18} {}", label, assertion.detail())
}

/// JSON error envelope (written to stdout with non-zero exit).
#[derive(Debug, Serialize)]
pub struct JsonError {
    pub ok: bool,
    pub schema_id: &'static str,
    pub tool_version: &'static str,
    pub generated_at: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl JsonError {
    pub const SCHEMA_ID: &'static str = "migverify.error";

    pub fn new(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            ok: false,
            schema_id: Self::SCHEMA_ID,
            tool_version: env!("CARGO_PKG_VERSION"),
            generated_at: chrono::Utc::now().to_rfc3339(),
            error: message.into(),
            details,
        }
    }

    pub fn print(&self) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{{\"ok\":false,\"error\":\"serialization failed\"}}"),
        }
    }
}
