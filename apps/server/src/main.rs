//! Now-playing distribution server.
//!
//! Runs one of the two process roles:
//!
//! - `producer`: polls Spotify and exposes the bridge routes
//! - `edge`: follows a producer and serves WebSocket subscribers

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nowplaying_core::{bind, bootstrap_edge, bootstrap_producer, start_server, ServerError};
use tokio::signal;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "nowplaying-server")]
#[command(about = "Distributes the currently playing Spotify track to web clients")]
#[command(version)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "NOWPLAYING_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", env = "NOWPLAYING_LOG_LEVEL")]
    log_level: String,

    /// HTTP port to bind (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Poll Spotify and publish changes to edge processes
    Producer,
    /// Follow a producer and serve subscribers
    Edge {
        /// Base URL of the producer (overrides config)
        #[arg(long)]
        producer_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .format_timestamp_millis()
        .init();

    log::info!("Now-playing server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Role::Edge {
        producer_url: Some(ref url),
    } = args.role
    {
        config.producer_url = url.clone();
    }

    let core_config = config.to_core_config();
    let listener = bind(config.bind_addr())
        .await
        .context("Failed to bind HTTP listener")?;

    match args.role {
        Role::Producer => {
            let services = bootstrap_producer(&core_config, config.spotify.clone())
                .context("Failed to bootstrap producer")?;
            let poll_task = services.start_background_tasks();

            log::info!("Producer listening on {}", config.bind_addr());
            let server = tokio::spawn(start_server(
                listener,
                services.router(),
                services.cancel_token.clone(),
            ));
            run_until_shutdown(server, || services.shutdown()).await?;

            let _ = poll_task.await;
        }
        Role::Edge { .. } => {
            let services = bootstrap_edge(&core_config, &config.producer_url)
                .context("Failed to bootstrap edge")?;
            let relay_task = services.start_background_tasks();

            log::info!(
                "Edge listening on {}, following {}",
                config.bind_addr(),
                config.producer_url
            );
            let server = tokio::spawn(start_server(
                listener,
                services.router(),
                services.cancel_token.clone(),
            ));
            run_until_shutdown(server, || services.shutdown()).await?;

            let _ = relay_task.await;
        }
    }

    log::info!("Server stopped");
    Ok(())
}

/// Serves until a shutdown signal arrives or the server fails.
async fn run_until_shutdown(
    mut server: JoinHandle<Result<(), ServerError>>,
    shutdown: impl FnOnce(),
) -> Result<()> {
    tokio::select! {
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, stopping...");
            shutdown();
        }
        result = &mut server => {
            shutdown();
            return result.context("Server task panicked")?.context("Server failed");
        }
    }

    server
        .await
        .context("Server task panicked")?
        .context("Server failed")
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
