//! Database client invocation through a container runtime.
//!
//! Every engine is reached the same way: `<runtime> exec -i <container>
//! <client> ...` with SQL piped on stdin. The captured result keeps the exit
//! status instead of discarding it, so callers decide whether a non-zero
//! status matters (the migration runner logs it, single-value reads only care whether
//! the database was reached at all).

use anyhow::{Context, Result};
use regex::Regex;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Captured output of one client invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed (timeout or signal)
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// stdout followed by stderr, for diagnostic logging
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (false, false) => format!(
                "{}\n{}",
                self.stdout.trim_end(),
                self.stderr.trim_end()
            ),
        }
    }

    /// One-line reason for a failed invocation.
    pub fn failure_reason(&self) -> String {
        if self.timed_out {
            return "timed out".to_string();
        }
        let first_error_line = self
            .stderr
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("no error output");
        match self.exit_code {
            Some(code) => format!("exit code {}: {}", code, first_error_line),
            None => format!("terminated by signal: {}", first_error_line),
        }
    }

    /// Client error lines found in stdout and stderr, in order.
    ///
    /// psql run with `ON_ERROR_STOP=0` exits 0 after failed statements, so
    /// these lines are the only trace of them.
    pub fn error_lines(&self) -> Vec<String> {
        let pattern = error_line_pattern();
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .map(str::trim)
            .filter(|line| pattern.is_match(line))
            .map(str::to_string)
            .collect()
    }

    /// Why this invocation did not run cleanly, or `None` when it did.
    pub fn problem(&self) -> Option<String> {
        if !self.success() {
            return Some(self.failure_reason());
        }
        self.error_lines()
            .into_iter()
            .next()
            .map(|line| format!("client reported: {}", line))
    }
}

fn error_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // mysql: "ERROR 1061 (42000) at line 12: ..."
    // psql: "psql:<stdin>:12: ERROR:  ..." / "ERROR:  ..."
    // sqlite3: "Parse error near line 3: ..." / "Runtime error near line 3: ..." / "Error: ..."
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^(?:psql:[^:]*:\d+: )?(?:ERROR\b|Error:|Parse error|Runtime error).*$")
            .expect("error line pattern is valid")
    })
}

/// Exit codes of `<runtime> exec` itself: daemon error, not executable, not found.
const RUNTIME_EXIT_CODES: [i32; 3] = [125, 126, 127];

/// Runtime messages meaning the container was never entered (lowercase).
const RUNTIME_MARKERS: [&str; 5] = [
    "error response from daemon",
    "cannot connect to the docker daemon",
    "no such container",
    "no container with name or id",
    "executable file not found",
];

/// How a client says it never reached the database, as opposed to a SQL
/// statement failing once connected.
///
/// Runtime failures (`docker exec` could not enter the container) always
/// count. Engines add their own connection exit codes and stderr markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnreachableSignals {
    pub exit_codes: &'static [i32],
    /// Matched case-insensitively against stderr
    pub stderr_markers: &'static [&'static str],
}

impl UnreachableSignals {
    /// Only the container runtime's own failures.
    pub const RUNTIME: UnreachableSignals = UnreachableSignals {
        exit_codes: &[],
        stderr_markers: &[],
    };

    /// True when `out` shows the database was not reached.
    ///
    /// Timeouts and kills are included; a clean exit never is.
    pub fn matches(&self, out: &CommandOutput) -> bool {
        let code = match out.exit_code {
            _ if out.timed_out => return true,
            None => return true,
            Some(0) => return false,
            Some(code) => code,
        };
        if RUNTIME_EXIT_CODES.contains(&code) || self.exit_codes.contains(&code) {
            return true;
        }
        let stderr = out.stderr.to_lowercase();
        RUNTIME_MARKERS
            .iter()
            .chain(self.stderr_markers.iter())
            .any(|marker| stderr.contains(&marker.to_lowercase()))
    }
}

/// A fully-resolved client command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ClientCommand {
    /// Command line with credentials masked, for `--verbose` output.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().map(|a| redact_arg(a)));
        parts.join(" ")
    }

    /// Run the command, piping `input` to stdin, bounded by `timeout`.
    ///
    /// Only a failure to spawn is an error. Non-zero exits and timeouts are
    /// reported through the returned [`CommandOutput`].
    ///
    /// On timeout only the local process (`docker exec`) is killed. The
    /// client inside the container is not signalled and may keep running,
    /// holding locks on the database, until its current statement ends.
    pub async fn run(&self, input: &str, timeout: Duration) -> Result<CommandOutput> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to execute {}", self.program))?;

        let mut stdin = child
            .stdin
            .take()
            .context("Client process has no stdin")?;
        let input = input.to_owned();

        // Written from a separate task so a chatty client cannot deadlock us
        // on a full stdout pipe.
        let writer = tokio::spawn(async move {
            let _ = stdin.write_all(input.as_bytes()).await;
            let _ = stdin.shutdown().await;
        });

        let waited = tokio::time::timeout(timeout, child.wait_with_output()).await;
        writer.abort();

        match waited {
            Ok(result) => {
                let output = result
                    .with_context(|| format!("Failed to wait for {}", self.program))?;
                Ok(CommandOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    exit_code: output.status.code(),
                    timed_out: false,
                })
            }
            Err(_) => Ok(CommandOutput {
                stdout: String::new(),
                stderr: format!(
                    "{} timed out after {:?}; the client inside the container may still be running",
                    self.display(),
                    timeout
                ),
                exit_code: None,
                timed_out: true,
            }),
        }
    }
}

/// How to reach one database container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerExec {
    pub runtime: String,
    pub container: String,
    /// Environment passed into the container (`-e KEY=VALUE`)
    pub env: Vec<(String, String)>,
}

impl ContainerExec {
    pub fn new(runtime: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            container: container.into(),
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Build `<runtime> exec -i [-e K=V]... <container> <client_argv>...`
    pub fn command(&self, client_argv: &[String]) -> ClientCommand {
        let mut args = vec!["exec".to_string(), "-i".to_string()];
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(self.container.clone());
        args.extend(client_argv.iter().cloned());

        ClientCommand {
            program: self.runtime.clone(),
            args,
        }
    }
}

/// Mask the value of `*PASSWORD=` / `*PWD=` assignments and `-p<secret>`.
fn redact_arg(arg: &str) -> String {
    if let Some((key, _value)) = arg.split_once('=') {
        let upper = key.to_ascii_uppercase();
        if upper.ends_with("PASSWORD") || upper.ends_with("PWD") {
            return format!("{}=****", key);
        }
    }
    if let Some(rest) = arg.strip_prefix("--password=") {
        if !rest.is_empty() {
            return "--password=****".to_string();
        }
    }
    arg.to_string()
}
