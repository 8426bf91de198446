// SPDX-License-Identifier: BUSL-1.1
//! # didreg CLI entry point
//!
//! Parses command-line arguments, initializes logging, resolves the base
//! registry configuration, and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use didreg_cli::config_cmd::{run_config, ConfigArgs};
use didreg_cli::load_config;
use didreg_cli::replay::{run_replay, ReplayArgs};

/// DID registry toolchain.
///
/// Replays scripted identity, credential, and status list operations
/// against an in-memory registry and checks every outcome.
#[derive(Parser, Debug)]
#[command(name = "didreg", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Path to a YAML registry configuration. Defaults to `DIDREG_*`
    /// environment variables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a YAML script of registry operations.
    Replay(ReplayArgs),

    /// Print or check the effective registry configuration.
    Config(ConfigArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "didreg starting");

    let result = load_config(cli.config.as_deref()).and_then(|config| match &cli.command {
        Commands::Replay(args) => run_replay(args, &config),
        Commands::Config(args) => run_config(args, &config),
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

/// `RUST_LOG` wins when set; otherwise verbosity picks the level.
fn init_tracing(verbose: u8, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parse_replay() {
        let cli = Cli::try_parse_from(["didreg", "replay", "script.yaml"]).unwrap();
        if let Commands::Replay(args) = cli.command {
            assert_eq!(args.script, PathBuf::from("script.yaml"));
            assert!(!args.json);
            assert!(args.audit_out.is_none());
        } else {
            panic!("expected replay");
        }
    }

    #[test]
    fn cli_parse_replay_with_options() {
        let cli = Cli::try_parse_from([
            "didreg",
            "replay",
            "script.yaml",
            "--json",
            "--audit-out",
            "audit.json",
        ])
        .unwrap();
        if let Commands::Replay(args) = cli.command {
            assert!(args.json);
            assert_eq!(args.audit_out, Some(PathBuf::from("audit.json")));
        } else {
            panic!("expected replay");
        }
    }

    #[test]
    fn cli_parse_config_check() {
        let cli = Cli::try_parse_from(["didreg", "config", "--check"]).unwrap();
        assert!(matches!(cli.command, Commands::Config(ConfigArgs { check: true, .. })));
    }

    #[test]
    fn cli_parse_global_options() {
        let cli = Cli::try_parse_from([
            "didreg",
            "-vv",
            "--log-format",
            "json",
            "--config",
            "registry.yaml",
            "config",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("registry.yaml")));
    }

    #[test]
    fn cli_parse_defaults() {
        let cli = Cli::try_parse_from(["didreg", "config"]).unwrap();
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_parse_no_subcommand_errors() {
        assert!(Cli::try_parse_from(["didreg"]).is_err());
    }

    #[test]
    fn cli_parse_replay_requires_script() {
        assert!(Cli::try_parse_from(["didreg", "replay"]).is_err());
    }

    #[test]
    fn cli_parse_bad_log_format_errors() {
        assert!(Cli::try_parse_from(["didreg", "--log-format", "xml", "config"]).is_err());
    }
}
