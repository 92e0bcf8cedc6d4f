//! Read-only access to historical files through git.
//!
//! Snapshots are read with `git show <tag>:<path>`, which never touches the
//! working tree or the index.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `tag` names an existing tag in this repository.
    pub async fn tag_exists(&self, tag: &str) -> Result<bool> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(["rev-parse", "--verify", "--quiet"])
            .arg(format!("refs/tags/{}", tag))
            .output()
            .await
            .context("Failed to execute git")?;
        Ok(output.status.success())
    }

    /// Content of `path` as it was at `tag`.
    ///
    /// `path` is relative to the root, which may be a subdirectory of the
    /// repository; `./` makes git resolve it from there.
    pub async fn show(&self, tag: &str, path: &str) -> Result<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .arg("show")
            .arg(format!("{}:./{}", tag, path))
            .output()
            .await
            .context("Failed to execute git")?;

        if !output.status.success() {
            bail!(
                "git show {}:{} failed: {}",
                tag,
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        String::from_utf8(output.stdout)
            .with_context(|| format!("{}:{} is not valid UTF-8", tag, path))
    }
}
