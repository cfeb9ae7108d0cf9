//! # presale-ctl
//!
//! Operator CLI for the presale lifecycle.
//!
//! ## Commands
//!
//! - `status`: show the contract's live/finalized flags (`--json` for JSON)
//! - `controls`: list the transitions currently available
//! - `start`: `setLive(true)`
//! - `pause`: `setLive(false)`
//! - `finalize`: `finalize()`, after an interactive y/N (`--yes` answers it)
//!
//! ## Configuration
//!
//! `--config <file>` loads a TOML file; `PRESALE_*` environment
//! variables override it. See `ControlConfig`.
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use presale_control::{
    AuthorizationGate, ConfirmationPrompt, ControlConfig, JsonRpcClient,
    LifecycleController, RpcWallet, RpcWriterFactory, TracingNotifier, TransitionRequest,
};

#[derive(Parser)]
#[command(version, about = "Presale lifecycle control")]
struct Cli {
    /// TOML config file. PRESALE_* environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the presale's lifecycle flags.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// List the transitions the connected admin can issue now.
    Controls,
    /// Open the presale for contributions.
    Start,
    /// Stop accepting contributions.
    Pause,
    /// Permanently close the presale.
    Finalize {
        /// Answer the confirmation prompt with yes.
        #[arg(long)]
        yes: bool,
    },
}

/// Asks on stdin; anything but `y`/`yes` is a no.
struct StdinPrompt;

impl ConfirmationPrompt for StdinPrompt {
    fn confirm(&self, question: &str) -> bool {
        print!("{} [y/N] ", question);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// `--yes`: the operator already answered on the command line.
struct AssumeYes;

impl ConfirmationPrompt for AssumeYes {
    fn confirm(&self, question: &str) -> bool {
        info!(question, "confirmed by --yes");
        true
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ControlConfig::load_from_file(path)?,
        None => ControlConfig::default(),
    }
    .apply_env()?;
    config.validate()?;

    let contract = config.contract()?;
    let rpc = JsonRpcClient::new(config.rpc_url.clone())?;
    let wallet = RpcWallet::connect(
        rpc.clone(),
        contract,
        config.chain_id,
        config.operator_identity()?,
    )
    .await?;

    let prompt: Arc<dyn ConfirmationPrompt> = match cli.cmd {
        Commands::Finalize { yes: true } => Arc::new(AssumeYes),
        _ => Arc::new(StdinPrompt),
    };

    let controller = Arc::new(
        LifecycleController::new(
            AuthorizationGate::new(config.authorized_set()?),
            Arc::new(wallet),
            Arc::new(RpcWriterFactory::new(rpc, contract, config.receipt_poll_interval())),
            Arc::new(TracingNotifier),
            prompt,
        )
        .with_confirmation_timeout(config.confirmation_timeout()),
    );

    if !controller.is_active() {
        bail!("connected account is not a presale administrator");
    }
    if !controller.sync_connection().await {
        bail!("could not read presale status from {}", config.rpc_url);
    }

    let request = match cli.cmd {
        Commands::Status { json } => {
            let state = controller.state();
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                println!("presale: {}", state);
                println!("  live:      {}", state.live);
                println!("  finalized: {}", state.finalized);
            }
            return Ok(());
        }
        Commands::Controls => {
            let offered = controller.offered_transitions();
            if offered.is_empty() {
                println!("no controls available (presale {})", controller.state());
            }
            for t in offered {
                println!("{:<18} {}", t.label(), t);
            }
            return Ok(());
        }
        Commands::Start => TransitionRequest::SetLive(true),
        Commands::Pause => TransitionRequest::SetLive(false),
        Commands::Finalize { .. } => TransitionRequest::Finalize,
    };

    let outcome = controller.request(request).await?;
    info!(tx_hash = %outcome.tx_hash, block = outcome.block_number, "confirmed");

    let reconciled = controller.refresh().await.unwrap_or(outcome.state);
    println!("presale: {}", reconciled);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_yes_flag_selects_assume_yes() {
        let cli = Cli::parse_from(["presale-ctl", "finalize", "--yes"]);
        assert!(matches!(cli.cmd, Commands::Finalize { yes: true }));
        assert!(AssumeYes.confirm(presale_control::FINALIZE_QUESTION));
    }

    #[test]
    fn finalize_without_yes_prompts() {
        let cli = Cli::parse_from(["presale-ctl", "finalize"]);
        assert!(matches!(cli.cmd, Commands::Finalize { yes: false }));
    }
}
