//! goclaw binary: operate the gateway runtime and its stores from the command line.
//!
//! Subcommands: `gateway` (run/status/health/probe/service/reload/history/rollback),
//! `memory` (status/index/search/backend), `channels` (list/status),
//! `config show`, `onboard`, `configure`.

mod commands;
mod log_format;
mod logging;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "goclaw")]
#[command(about = "goclaw: multi-channel conversational agent runtime", version)]
struct Cli {
    /// Path to config.json (default: ~/.goclaw/config.json, then ./config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run or operate the gateway service
    Gateway {
        #[command(subcommand)]
        cmd: GatewayCommand,
    },
    /// Inspect or rebuild the memory index
    Memory {
        #[command(subcommand)]
        cmd: MemoryCommand,
    },
    /// Inspect configured channels
    Channels {
        #[command(subcommand)]
        cmd: ChannelsCommand,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommand,
    },
    /// First-run guidance
    Onboard,
    /// Interactive configuration guidance
    Configure,
}

#[derive(Subcommand, Debug)]
enum GatewayCommand {
    /// Run the gateway in the foreground
    Run {
        /// Listen address override (default: from config `gateway.host:port`)
        #[arg(long, value_name = "ADDR")]
        addr: Option<String>,
    },
    /// Show a running gateway's status
    Status,
    /// Probe a running gateway's health endpoint
    Health,
    /// Connect to a running gateway over WebSocket and run one control-plane round-trip
    Probe,
    /// Install as a system service (not implemented; prints guidance)
    Install,
    /// Uninstall the system service (not implemented; prints guidance)
    Uninstall,
    /// Start the installed service (not implemented; prints guidance)
    Start,
    /// Stop the installed service (not implemented; prints guidance)
    Stop,
    /// Restart the installed service (not implemented; prints guidance)
    Restart,
    /// Re-load and re-validate the config file, recording the attempt in history
    Reload,
    /// Show the config reload history
    History,
    /// Restore a config snapshot from history (latest success when no index given)
    Rollback {
        /// History index to roll back to
        index: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum MemoryCommand {
    /// Show record counts and backend health
    Status,
    /// Rebuild the workspace index once
    Index,
    /// Search the memory store
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show which backend and embedder are configured
    Backend,
}

#[derive(Subcommand, Debug)]
enum ChannelsCommand {
    /// List configured channels
    List,
    /// Show per-channel enablement and credential state
    Status,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective config (secrets redacted)
    Show,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Environment bootstrap first so GOSKILLS_* overrides and API keys from
    // ~/.config/goclaw/config.toml or ./.env are visible to the loader.
    goclaw_config::load_and_apply("goclaw", None).ok();

    let cli = Cli::parse();
    let _log_guard = logging::init();

    let result = match cli.cmd {
        Command::Gateway { cmd } => match cmd {
            GatewayCommand::Run { addr } => commands::gateway::run(cli.config, addr).await,
            GatewayCommand::Status => commands::gateway::status(cli.config).await,
            GatewayCommand::Health => commands::gateway::health(cli.config).await,
            GatewayCommand::Probe => commands::gateway::probe(cli.config).await,
            GatewayCommand::Install
            | GatewayCommand::Uninstall
            | GatewayCommand::Start
            | GatewayCommand::Stop
            | GatewayCommand::Restart => {
                commands::gateway::service_stub();
                Ok(())
            }
            GatewayCommand::Reload => commands::gateway::reload(cli.config).await,
            GatewayCommand::History => commands::gateway::history(),
            GatewayCommand::Rollback { index } => commands::gateway::rollback(cli.config, index),
        },
        Command::Memory { cmd } => match cmd {
            MemoryCommand::Status => commands::memory::status(cli.config).await,
            MemoryCommand::Index => commands::memory::index(cli.config).await,
            MemoryCommand::Search { query, limit } => commands::memory::search(cli.config, &query, limit).await,
            MemoryCommand::Backend => commands::memory::backend(cli.config).await,
        },
        Command::Channels { cmd } => match cmd {
            ChannelsCommand::List => commands::channels::list(cli.config).await,
            ChannelsCommand::Status => commands::channels::status(cli.config).await,
        },
        Command::Config { cmd } => match cmd {
            ConfigCommand::Show => commands::config_cmd::show(cli.config).await,
        },
        Command::Onboard => {
            commands::onboard();
            Ok(())
        }
        Command::Configure => {
            commands::configure();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("goclaw: {e}");
            ExitCode::FAILURE
        }
    }
}
