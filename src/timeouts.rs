//! Per-call deadlines for database client invocations.
//!
//! Every client process the harness spawns is bounded. A hung container or
//! a client waiting on a lock would otherwise block the whole run.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

pub mod defaults {
    use std::time::Duration;

    /// Single-value reads: scalar queries and existence checks
    pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

    /// Scripts: schema loads, migrations, restore
    pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(300);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub query_timeout: Duration,
    pub script_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            query_timeout: defaults::QUERY_TIMEOUT,
            script_timeout: defaults::SCRIPT_TIMEOUT,
        }
    }
}

impl TimeoutConfig {
    pub fn new(query_timeout: Option<Duration>, script_timeout: Option<Duration>) -> Self {
        Self {
            query_timeout: query_timeout.unwrap_or(defaults::QUERY_TIMEOUT),
            script_timeout: script_timeout.unwrap_or(defaults::SCRIPT_TIMEOUT),
        }
    }
}

/// Parse `<n>ms`, `<n>s`, `<n>m` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s*(ms|s|m)?\s*$").expect("duration pattern is valid")
    });

    let caps = pattern
        .captures(s)
        .with_context(|| format!("Invalid duration '{}': expected e.g. 30s, 500ms, 5m", s))?;
    let amount: u64 = caps[1]
        .parse()
        .with_context(|| format!("Duration out of range: '{}'", s))?;
    if amount == 0 {
        bail!("Duration must be greater than zero: '{}'", s.trim());
    }

    Ok(match caps.get(2).map(|m| m.as_str()) {
        Some("ms") => Duration::from_millis(amount),
        Some("m") => Duration::from_secs(amount.saturating_mul(60)),
        _ => Duration::from_secs(amount),
    })
}

/// Exit with the INTERRUPTED code on Ctrl+C (SIGINT).
///
/// Client processes belong to the same foreground process group and get
/// the signal directly. Whatever engine was mid-scenario is left in the
/// historical schema; rerunning the harness restores it.
pub fn setup_ctrlc_handler() {
    use crate::exit_codes;

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Failed to listen for Ctrl+C: {}", e);
            return;
        }

        eprintln!("\nInterrupted (Ctrl+C).");
        std::process::exit(exit_codes::INTERRUPTED);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let config = TimeoutConfig::default();
        assert_eq!(config.query_timeout, Duration::from_secs(30));
        assert_eq!(config.script_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_timeout_config_new_with_overrides() {
        let config = TimeoutConfig::new(Some(Duration::from_secs(5)), None);
        assert_eq!(config.query_timeout, Duration::from_secs(5));
        assert_eq!(config.script_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_parse_duration_accepts_units_and_bare_seconds() {
        let cases = [
            ("45s", Duration::from_secs(45)),
            ("250ms", Duration::from_millis(250)),
            ("5m", Duration::from_secs(300)),
            ("90", Duration::from_secs(90)),
            (" 2 m ", Duration::from_secs(120)),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_duration(input).unwrap(), expected, "{:?}", input);
        }
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for input in ["", "soon", "1h", "-3s", "1.5s", "0", "0ms"] {
            assert!(parse_duration(input).is_err(), "{:?} should be rejected", input);
        }
    }
}
