//! gnmilite CLI library: argument parsing, bootstrap and the JSON-Lines
//! transport.

mod cli;
mod control;
pub mod rpc;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use control::ProcessControl;
use gnmilite_core::config::ServerConfig;
use gnmilite_core::observability::LogControl;
use gnmilite_core::tree::{load_device, Device};
use gnmilite_server::{add_management_module, Driver, ServerOptions};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Run the CLI: parse args and dispatch.
pub fn run_cli() -> Result<()> {
    let log = Arc::new(gnmilite_core::observability::init_tracing());
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            stdio,
            listen,
            models,
            max_request_bytes,
        } => {
            let mut config = ServerConfig::from_env().with_cli_overrides(listen, models);
            if let Some(n) = max_request_bytes.filter(|n| *n > 0) {
                config.max_request_bytes = n;
            }
            serve(config, stdio, log)?;
        }
        Commands::Check { models } => {
            let device = load_device(&models)?;
            for m in device.modules() {
                println!("{}\t{}\t{}", m.name, m.organization, m.revision);
            }
        }
    }
    Ok(())
}

fn serve(config: ServerConfig, stdio: bool, log: Arc<LogControl>) -> Result<()> {
    if config.models.is_empty() {
        tracing::warn!("no module definitions given; serving only the management module");
    }
    let mut device = load_device(&config.models)?;
    let (rebind_tx, rebind_rx) = mpsc::unbounded_channel();
    let control = ProcessControl::new(Arc::clone(&log), (!stdio).then_some(rebind_tx));
    let opts = ServerOptions {
        listen: config.listen.clone(),
    };
    add_management_module(&mut device, log.debug_enabled(), opts, Arc::new(control))
        .context("Failed to register management module")?;
    let device: Arc<dyn Device> = Arc::new(device);
    let driver = Arc::new(Driver::new(device));

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(async {
        let shutdown = CancellationToken::new();
        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, shutting down");
                }
                shutdown.cancel();
            }
        });

        if stdio {
            rpc::serve_stdio(driver, config.max_request_bytes, shutdown).await
        } else {
            let listener = TcpListener::bind(&config.listen)
                .await
                .with_context(|| format!("Failed to bind {}", config.listen))?;
            rpc::serve_tcp(driver, listener, rebind_rx, config.max_request_bytes, shutdown).await
        }
    })
}
