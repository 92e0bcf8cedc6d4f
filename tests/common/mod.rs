//! Common test infrastructure for migverify integration tests.
//!
//! Provides:
//! - TestRepo: temp git repository laid out like a Poweradmin checkout
//! - Binary runners with an isolated environment
//! - Output assertion helpers

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

pub const TAG: &str = "v4.0.5";

const ENGINES: [&str; 3] = ["mysql", "pgsql", "sqlite"];

/// A throwaway repository with schema files committed under a tag.
pub struct TestRepo {
    pub dir: tempfile::TempDir,
    env: Vec<(String, String)>,
}

impl TestRepo {
    /// Repository with schema and migration files for every engine.
    /// When `tag` is `Some`, the schema commit is tagged with it.
    /// Returns `None` when git is unavailable.
    pub fn new(tag: Option<&str>) -> Option<Self> {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = dir.path();

        if !git(root, &["init", "-q"]) {
            return None;
        }

        std::fs::create_dir_all(root.join("sql")).expect("Failed to create sql/");
        for engine in ENGINES {
            std::fs::write(
                root.join(format!("sql/poweradmin-{}-db-structure.sql", engine)),
                "CREATE TABLE users (id INTEGER PRIMARY KEY);\n",
            )
            .expect("Failed to write schema");
            std::fs::write(
                root.join(format!("sql/poweradmin-{}-update-to-4.1.0.sql", engine)),
                "ALTER TABLE users ADD COLUMN auth_method VARCHAR(20) NOT NULL DEFAULT 'sql';\n",
            )
            .expect("Failed to write migration");
        }

        let committed = git(root, &["add", "."])
            && git(
                root,
                &[
                    "-c",
                    "user.name=test",
                    "-c",
                    "user.email=test@example.com",
                    "commit",
                    "-q",
                    "-m",
                    "schema",
                ],
            );
        if !committed {
            return None;
        }
        if let Some(tag) = tag {
            if !git(root, &["tag", tag]) {
                return None;
            }
        }

        Some(Self {
            dir,
            env: Vec::new(),
        })
    }

    /// Extra environment for every run.
    #[allow(dead_code)]
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    #[allow(dead_code)]
    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    #[allow(dead_code)]
    pub fn write_file(&self, relative: &str, contents: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, contents)
            .unwrap_or_else(|_| panic!("Failed to write {}", relative));
    }

    /// Run migverify inside the repository with an isolated environment
    pub fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_migverify"));
        cmd.args(args)
            .current_dir(self.dir.path())
            .env_clear()
            .env("HOME", self.dir.path())
            .env("PATH", std::env::var("PATH").unwrap_or_default())
            .env("NO_COLOR", "1");
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.output().expect("Failed to execute migverify")
    }

    /// Run migverify and assert a specific exit code
    pub fn run_expecting(&self, args: &[&str], expected_code: i32) -> Output {
        let output = self.run(args);
        assert_eq!(
            output.status.code(),
            Some(expected_code),
            "migverify {:?} expected exit {} but got {:?}:\nstdout: {}\nstderr: {}",
            args,
            expected_code,
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        output
    }
}

fn git(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run migverify outside any repository
#[allow(dead_code)]
pub fn run_bare(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_migverify"))
        .args(args)
        .env_clear()
        .env("PATH", std::env::var("PATH").unwrap_or_default())
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute migverify")
}

// ============================================================================
// Output assertion helpers
// ============================================================================

/// Parse JSON output and return the value
pub fn parse_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| {
        panic!("Invalid JSON output:\n{}\nError: {}", stdout, e)
    })
}

/// Get stdout as string
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Get stderr as string
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

// ============================================================================
// Test skip helpers
// ============================================================================

/// Poweradmin checkout for end-to-end runs, from MIGVERIFY_E2E_ROOT.
#[allow(dead_code)]
pub fn e2e_root() -> Option<PathBuf> {
    std::env::var("MIGVERIFY_E2E_ROOT")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Skip test if git is not installed
#[macro_export]
macro_rules! repo_or_skip {
    ($tag:expr) => {
        match $crate::common::TestRepo::new($tag) {
            Some(repo) => repo,
            None => {
                eprintln!("Skipping test: git not available");
                return;
            }
        }
    };
}
