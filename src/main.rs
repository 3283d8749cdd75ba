//! Command-line entry point for Control Relay.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use control_relay::AppState;

/// Control Relay - drive a control system from Telegram.
#[derive(Parser, Debug)]
#[command(name = "control-relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform (defaults to `run`).
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the JSON config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to Telegram and relay commands until interrupted.
    Run,
    /// Verify the bot token with a single identity probe and exit.
    StatusCheck,
    /// Forget the bound operator so the next chat to write becomes it.
    ResetOperator,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "control_relay={level},control_relay_core={level},warn",
            level = default_level
        ))
    });

    let json_logging = std::env::var("CONTROL_RELAY_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let state = AppState::load(args.config).context("failed to load configuration")?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&state).await,
        Command::StatusCheck => {
            let bot = state.probe().await.context("bot token check failed")?;
            println!("Bot token OK: @{} (id {})", bot.username, bot.id);
            Ok(())
        }
        Command::ResetOperator => {
            let reset = state.reset_operator()?;
            match reset.previous {
                Some(chat_id) => println!("Operator binding for chat {} removed", chat_id),
                None => println!("No operator was bound"),
            }
            if let Some(pinned) = reset.pinned_by_env {
                println!(
                    "Warning: TELEGRAM_CHAT_ID={} is set in the environment; that chat stays the operator until it is unset",
                    pinned
                );
            }
            Ok(())
        }
    }
}

async fn run(state: &AppState) -> Result<()> {
    let manager = state
        .connection_manager()
        .context("failed to build the relay")?;

    let ready = manager.start().await.context("failed to connect")?;
    tracing::info!(
        bot = %ready.bot.username,
        control_api = %state.control_api_url(),
        "Relay running, press Ctrl+C to stop"
    );

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            tracing::info!("Shutdown requested");
            manager.stop().await.context("shutdown did not complete cleanly")?;
            Ok(())
        }
        _ = manager.closed() => {
            let reason = manager
                .status()
                .await
                .last_error
                .unwrap_or_else(|| "unknown error".to_string());
            manager.stop().await.context("shutdown did not complete cleanly")?;
            anyhow::bail!("relay stopped: {}", reason)
        }
    }
}
