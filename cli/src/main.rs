//! Tidemark CLI
//!
//! Command-line interface for managing metric index templates in the
//! document store.
//!
//! # Usage
//!
//! ```bash
//! tidemark --help
//! tidemark show-metrics
//! tidemark check-metrics osf --connection default
//! tidemark sync-metrics
//! ```

#![deny(unsafe_code)]

mod commands;
mod definitions;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shared::config::{self, Settings};
use shared::registry::Registry;

use definitions::DefinitionsFile;

/// Tidemark CLI - manage metric index templates in the document store
#[derive(Parser)]
#[command(name = "tidemark")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the metric definitions file
    #[arg(
        short,
        long,
        env = "TIDEMARK_DEFINITIONS",
        default_value = "tidemark.toml"
    )]
    definitions: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pretty-print a listing of all registered metrics
    ShowMetrics {
        /// Only list metrics in this namespace
        namespace: Option<String>,
    },
    /// Check that registered metrics have up-to-date index templates
    CheckMetrics {
        /// Only check metrics in this namespace
        namespace: Option<String>,
        /// Store connection to use (defaults to "default")
        #[arg(long)]
        connection: Option<String>,
    },
    /// Create or update index templates for all registered metrics
    SyncMetrics {
        /// Only sync metrics in this namespace
        namespace: Option<String>,
        /// Store connection to use (defaults to "default")
        #[arg(long)]
        connection: Option<String>,
    },
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    config::configure(Settings::from_env());

    let registry = Registry::global();
    let file = DefinitionsFile::load(&cli.definitions)?;
    file.apply(registry)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match &cli.command {
        Commands::ShowMetrics { namespace } => {
            commands::show_metrics(registry, namespace.as_deref(), &mut out)
        }
        Commands::CheckMetrics {
            namespace,
            connection,
        } => commands::check_metrics(
            registry,
            namespace.as_deref(),
            connection.as_deref(),
            &mut out,
        ),
        Commands::SyncMetrics {
            namespace,
            connection,
        } => commands::sync_metrics(
            registry,
            namespace.as_deref(),
            connection.as_deref(),
            &mut out,
        ),
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_requires_subcommand() {
        assert!(Cli::try_parse_from(["tidemark"]).is_err());
        assert!(Cli::try_parse_from(["tidemark", "show-metrics"]).is_ok());
    }

    #[test]
    fn test_cli_parse_check_with_connection() {
        let cli = Cli::try_parse_from([
            "tidemark",
            "check-metrics",
            "osf",
            "--connection",
            "reporting",
        ])
        .unwrap();
        match cli.command {
            Commands::CheckMetrics {
                namespace,
                connection,
            } => {
                assert_eq!(namespace.as_deref(), Some("osf"));
                assert_eq!(connection.as_deref(), Some("reporting"));
            }
            _ => panic!("expected check-metrics"),
        }
    }

    #[test]
    fn test_cli_parse_definitions_flag() {
        let cli =
            Cli::try_parse_from(["tidemark", "-d", "metrics.toml", "sync-metrics"]).unwrap();
        assert_eq!(cli.definitions, PathBuf::from("metrics.toml"));
    }
}
