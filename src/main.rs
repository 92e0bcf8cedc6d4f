use anyhow::{Context, Result};
use clap::{error::ErrorKind, Parser};
use std::path::PathBuf;

mod client;
mod config;
mod engine;
mod exit_codes;
mod expectations;
mod fixtures;
mod migration;
mod orchestrator;
mod output;
mod report;
mod schema;
mod sql;
mod timeouts;
mod vcs;
mod verify;

use config::Config;
use engine::EngineKind;
use output::{JsonError, Output};

/// Version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "migverify")]
#[command(version = VERSION)]
#[command(
    about = "Verify the Poweradmin 4.1.0 upgrade migration against MySQL, PostgreSQL and SQLite",
    long_about = None
)]
#[command(after_help = "\
With no engine flag every engine is tested, in order: MySQL, PostgreSQL, SQLite.

Each engine runs an empty scenario and a with-data scenario, then gets the
current schema restored. The historical schema comes from a git tag
(MIGVERIFY_TAG, default v4.0.5).

Exit status: 0 when every assertion passed, 1 otherwise, 130 on Ctrl+C.")]
struct Cli {
    /// Test MySQL/MariaDB
    #[arg(long)]
    mysql: bool,

    /// Test PostgreSQL
    #[arg(long)]
    pgsql: bool,

    /// Test SQLite
    #[arg(long)]
    sqlite: bool,

    /// Path to config file (default: ./migverify.toml if present)
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Only print failing assertions and the summary
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show client commands and their output
    #[arg(short, long)]
    verbose: bool,

    /// Print the report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Deadline for each single-value query (e.g. 30s, 500ms, 1m)
    #[arg(long = "query-timeout", value_name = "DURATION")]
    query_timeout: Option<String>,

    /// Deadline for each schema load, migration or restore
    #[arg(long = "script-timeout", value_name = "DURATION")]
    script_timeout: Option<String>,
}

impl Cli {
    /// Selected engines in canonical order; none selected means all.
    fn engines(&self) -> Vec<EngineKind> {
        let selected: Vec<EngineKind> = EngineKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                EngineKind::Mysql => self.mysql,
                EngineKind::Pgsql => self.pgsql,
                EngineKind::Sqlite => self.sqlite,
            })
            .collect();

        if selected.is_empty() {
            EngineKind::ALL.to_vec()
        } else {
            selected
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before parsing CLI so env vars are available)
    let _ = dotenvy::dotenv();

    // Check for --json flag early (before full parsing) for error handling
    let json_mode = std::env::args().any(|arg| arg == "--json");

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let meta = matches!(
                e.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            );
            if json_mode && !meta {
                JsonError::new(e.to_string(), None).print();
                std::process::exit(2);
            }
            e.exit();
        }
    };

    let output = Output::new(cli.json, cli.quiet, cli.verbose);
    timeouts::setup_ctrlc_handler();

    match run(&cli, &output).await {
        Ok(code) => {
            output.flush();
            std::process::exit(code);
        }
        Err(e) => {
            if cli.json {
                JsonError::new(e.to_string(), Some(format!("{e:#}"))).print();
            } else {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(exit_codes::FAILED);
        }
    }
}

async fn run(cli: &Cli, output: &Output) -> Result<i32> {
    let config =
        Config::load(cli.config_path.as_deref()).context("Failed to load configuration")?;
    let timeouts = config.timeouts(cli.query_timeout.as_deref(), cli.script_timeout.as_deref())?;
    let engines = cli.engines();

    let results = orchestrator::run(&config, &engines, timeouts, output).await?;

    if output.is_json() {
        output.json(&results.to_json(chrono::Utc::now().to_rfc3339()))?;
    } else {
        output.data("");
        output.data(&results.format_summary());
    }

    Ok(results.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["migverify"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_no_engine_flag_selects_all() {
        assert_eq!(parse(&[]).engines(), EngineKind::ALL.to_vec());
    }

    #[test]
    fn test_engine_flags_keep_canonical_order() {
        assert_eq!(
            parse(&["--sqlite", "--mysql"]).engines(),
            vec![EngineKind::Mysql, EngineKind::Sqlite]
        );
        assert_eq!(parse(&["--pgsql"]).engines(), vec![EngineKind::Pgsql]);
    }

    #[test]
    fn test_quiet_and_verbose_conflict() {
        assert!(Cli::try_parse_from(["migverify", "--quiet", "--verbose"]).is_err());
    }
}
