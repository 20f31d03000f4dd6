//! masterload - refresh database tables from YAML/JSON documents
//!
//! Every target is a document file or a directory of document files. Its
//! table is emptied and re-filled in one transaction, and targets are loaded
//! concurrently.
//!
//! # Usage
//!
//! ```bash
//! # Load two tables over TCP
//! masterload --host 127.0.0.1 --db master fixtures/users.yml fixtures/items
//!
//! # Load every subdirectory of a base directory
//! masterload --db master --basedir fixtures
//!
//! # Load selected tables only, settings from a file
//! masterload -c masterload.yaml --basedir fixtures --tables users,items
//! ```
//!
//! Report lines go to stdout, logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use secrecy::SecretString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use masterload::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "masterload")]
#[command(version, about = "Replace table contents with YAML/JSON documents, one transaction per table")]
struct Cli {
    /// Document files or directories, one per table
    targets: Vec<PathBuf>,

    /// Database host
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Database port
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Unix socket path
    #[arg(short = 'S', long)]
    socket: Option<String>,

    /// Database name
    #[arg(short = 'd', long = "db")]
    database: Option<String>,

    /// Database user (defaults to the current OS user)
    #[arg(short = 'u', long)]
    user: Option<String>,

    /// Database password
    #[arg(short = 'p', long, env = "MASTERLOAD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Extra driver parameter, repeatable
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Treat every subdirectory of this directory as a target
    #[arg(long, conflicts_with = "targets")]
    basedir: Option<PathBuf>,

    /// Only load these tables from the base directory
    #[arg(long, value_delimiter = ',', requires = "basedir")]
    tables: Vec<String>,

    /// Rows per INSERT statement
    #[arg(long)]
    batch_size: Option<usize>,

    /// How existing rows are removed (delete, truncate)
    #[arg(long)]
    purge: Option<PurgeMode>,

    /// Keep the auto-increment counter untouched
    #[arg(long)]
    no_reset_sequence: bool,

    /// Exit non-zero when any target fails
    #[arg(long)]
    strict: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            host: self.host.clone(),
            port: self.port,
            socket: self.socket.clone(),
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone().map(SecretString::from),
            params: self.params.iter().cloned().collect(),
        }
    }

    fn load_config(&self, mut config: LoadConfig) -> LoadConfig {
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        if let Some(mode) = self.purge {
            config.purge_mode = mode;
        }
        if self.no_reset_sequence {
            config.reset_sequence = false;
        }
        config
    }
}

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Success = 0,
    Usage = 1,
    NoTarget = 2,
    TargetFailed = 3,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Exit::Success.into(),
                _ => Exit::Usage.into(),
            };
        }
    };
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("masterload: {:#}", e);
            Exit::Usage.into()
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn run(cli: Cli) -> Result<Exit> {
    let file = match &cli.config {
        Some(path) => FileConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => FileConfig::default(),
    };

    let strict = cli.strict || file.strict;
    let load = cli.load_config(file.load.apply(LoadConfig::default()));
    load.validate().context("Invalid load settings")?;
    let options = cli.connection_options().or(file.database.into_options());

    let targets = target_paths(&cli)?;
    if targets.is_empty() {
        eprintln!("masterload: no target specified");
        return Ok(Exit::NoTarget);
    }

    let factory = MySqlConnectionFactory::new(&options).context("Invalid connection options")?;
    info!(
        database = %factory.describe(),
        targets = targets.len(),
        batch_size = load.batch_size,
        "Starting masterload"
    );

    let dispatcher = Dispatcher::new(Arc::new(factory), load);
    let mut dispatch = dispatcher.dispatch_paths(&targets);
    while let Some(outcome) = dispatch.next_outcome().await {
        println!("{}", outcome.report_line());
    }
    let summary = dispatch.finished().await?;
    println!("{}", summary.completion_line());

    Ok(exit_for(&summary, strict))
}

/// Explicit targets, or the subdirectories of `--basedir`
fn target_paths(cli: &Cli) -> Result<Vec<PathBuf>> {
    let Some(base) = &cli.basedir else {
        return Ok(cli.targets.clone());
    };

    let discovery = discover_targets(base, &cli.tables)
        .with_context(|| format!("Failed to scan {}", base.display()))?;
    if !discovery.is_complete() {
        for table in &discovery.missing {
            eprintln!("masterload: {}", Error::not_found(base.join(table)));
        }
        bail!("{} requested table(s) not found", discovery.missing.len());
    }
    Ok(discovery.targets)
}

fn exit_for(summary: &DispatchSummary, strict: bool) -> Exit {
    if strict && !summary.is_success() {
        Exit::TargetFailed
    } else {
        Exit::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["masterload"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_connection_flags() {
        let cli = cli(&[
            "--host", "db.internal", "--port", "3307", "--db", "master", "-u", "loader",
            "--param", "prefer_socket=false", "users.yml", "items",
        ]);

        assert_eq!(cli.targets, vec![PathBuf::from("users.yml"), PathBuf::from("items")]);
        let options = cli.connection_options();
        assert_eq!(
            options.address(),
            Address::Tcp {
                host: "db.internal".into(),
                port: 3307
            }
        );
        assert_eq!(
            options.connection_url().unwrap(),
            "mysql://loader@db.internal:3307/master?prefer_socket=false"
        );
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_load_flags_override_base() {
        let cli = cli(&["--batch-size", "50", "--purge", "truncate", "--no-reset-sequence", "t.yml"]);
        let config = cli.load_config(LoadConfig::default().with_batch_size(10));

        assert_eq!(config.batch_size, 50);
        assert_eq!(config.purge_mode, PurgeMode::Truncate);
        assert!(!config.reset_sequence);
    }

    #[test]
    fn test_basedir_conflicts_with_targets() {
        let result = Cli::try_parse_from(["masterload", "--basedir", "fixtures", "users.yml"]);
        assert!(result.is_err());

        let result = Cli::try_parse_from(["masterload", "--tables", "users"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_basedir_targets() {
        let dir = tempfile::tempdir().unwrap();
        for table in ["items", "users"] {
            std::fs::create_dir(dir.path().join(table)).unwrap();
        }
        let base = dir.path().to_str().unwrap();

        let all = target_paths(&cli(&["--basedir", base])).unwrap();
        assert_eq!(all, vec![dir.path().join("items"), dir.path().join("users")]);

        let some = target_paths(&cli(&["--basedir", base, "--tables", "users"])).unwrap();
        assert_eq!(some, vec![dir.path().join("users")]);

        assert!(target_paths(&cli(&["--basedir", base, "--tables", "users,ghosts"])).is_err());
    }

    #[test]
    fn test_no_targets_is_empty() {
        assert!(target_paths(&cli(&["--db", "master"])).unwrap().is_empty());
    }

    #[test]
    fn test_exit_codes() {
        let failed = DispatchSummary { done: 1, failed: 1 };
        let clean = DispatchSummary { done: 2, failed: 0 };

        assert_eq!(exit_for(&failed, false), Exit::Success);
        assert_eq!(exit_for(&failed, true), Exit::TargetFailed);
        assert_eq!(exit_for(&clean, true), Exit::Success);
        assert_eq!(Exit::NoTarget as u8, 2);
        assert_eq!(Exit::Usage as u8, 1);
    }

    #[tokio::test]
    async fn test_run_without_targets() {
        let exit = run(cli(&["--db", "master", "-u", "loader"])).await.unwrap();
        assert_eq!(exit, Exit::NoTarget);
    }

    #[tokio::test]
    async fn test_run_with_bad_batch_size() {
        assert!(run(cli(&["--batch-size", "0", "t.yml"])).await.is_err());
    }
}
