//! flockd: the Flock membership daemon.
//!
//! Wires a `Membership` coordinator to a logging delegate. Until a gossip
//! transport is attached, transport notifications are replayed from a
//! JSON script.
//!
//! # Usage
//!
//! ```text
//! flockd check-config flock.toml
//! flockd replay --config flock.toml script.json
//! ```

mod replay;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use flock_membership::MembershipConfig;
use tracing::info;

#[derive(Parser)]
#[command(name = "flockd", about = "Flock membership daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and validate a config file, then print the resolved timings.
    CheckConfig {
        /// Path to flock.toml.
        path: PathBuf,
    },

    /// Replay a script of transport notifications against a coordinator.
    Replay {
        /// Path to flock.toml.
        #[arg(long)]
        config: PathBuf,

        /// JSON array of replay steps.
        script: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("info,flockd=debug,flock_membership=debug")
                }),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::CheckConfig { path } => {
            let config = MembershipConfig::from_file(&path)?;
            println!("max_coalesce_time  = {:?}", config.max_coalesce_time);
            println!("min_quiescent_time = {:?}", config.min_quiescent_time);
            println!("leave_timeout      = {:?}", config.leave_timeout);
            Ok(())
        }
        Command::Replay { config, script } => {
            info!(path = ?config, "loading config");
            let config = MembershipConfig::from_file(&config)?;
            replay::run(config, &script).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_requires_config() {
        assert!(Cli::try_parse_from(["flockd", "replay", "script.json"]).is_err());

        let cli = Cli::try_parse_from([
            "flockd",
            "replay",
            "--config",
            "flock.toml",
            "script.json",
        ])
        .unwrap();
        let Command::Replay { config, script } = cli.command else {
            panic!("expected replay");
        };
        assert_eq!(config, PathBuf::from("flock.toml"));
        assert_eq!(script, PathBuf::from("script.json"));
    }
}
