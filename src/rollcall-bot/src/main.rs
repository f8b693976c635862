//! Rollcall - Slack roll-call bot binary.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use rollcall_bot::http::{HttpState, SignatureVerifier};
use rollcall_bot::{BotConfig, Dispatcher, SlackDirectory, SocketModeClient, TransportMode};

/// Rollcall Slack bot
#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "Slack bot that adds every workspace member to a channel on request")]
#[command(version)]
struct Args {
    /// Transport mode (socket or http); overrides ROLLCALL_MODE
    #[arg(short, long)]
    mode: Option<TransportMode>,

    /// HTTP listen port; overrides PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Skip the channel auto-join sweep at startup
    #[arg(long)]
    no_sweep: bool,
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

fn load_config(args: &Args) -> anyhow::Result<BotConfig> {
    let mut config = BotConfig::from_env().context("Failed to load config from environment")?;

    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.no_sweep {
        config.sweep_on_start = false;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run(config: BotConfig) -> anyhow::Result<()> {
    let directory = Arc::new(SlackDirectory::new(&config)?);
    let bot_user_id = directory
        .auth_test()
        .await
        .context("Slack authentication failed")?;
    info!("Authenticated as bot user {}", bot_user_id);

    let dispatcher = Arc::new(Dispatcher::new(directory).with_bot_user_id(bot_user_id));

    if config.sweep_on_start {
        let sweeper_dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            sweeper_dispatcher.sweeper().sweep().await;
        });
    }

    match config.mode {
        TransportMode::Socket => {
            let client = SocketModeClient::new(&config, dispatcher)?;
            let shutdown_tx = client.shutdown_handle();
            tokio::spawn(async move {
                shutdown_signal().await;
                let _ = shutdown_tx.send(());
            });

            info!("Starting Rollcall in Socket Mode");
            info!("Press Ctrl+C to stop");
            client.run().await?;
        }
        TransportMode::Http => {
            let secret = config
                .signing_secret()
                .context("HTTP mode requires SLACK_SIGNING_SECRET")?;
            let state = HttpState {
                dispatcher,
                verifier: SignatureVerifier::new(secret),
            };
            let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

            info!("Starting Rollcall HTTP transport on {}", addr);
            info!("Press Ctrl+C to stop");
            rollcall_bot::http::serve(addr, state, shutdown_signal()).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    setup_logging(&args.log_level, args.json_logs);

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = run(config).await {
        error!("Bot error: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("Bot stopped");
    ExitCode::SUCCESS
}
