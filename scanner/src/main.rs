#![allow(dead_code)]
mod error;
mod model;
mod observability;
mod radio;
mod rate_limiters;
mod scanner_config;
mod state;
#[cfg(test)]
mod testing;
mod transport;

use std::sync::Arc;

use anyhow::Context;
use mimalloc::MiMalloc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use model::AnchorRegistry;
use observability::StatusReceiver;
use radio::{RadioScanner, ReplayRadio};
use scanner_config::{config_dir, AppConfig, TransportMode};
use state::orchestrator::{Orchestrator, SessionConfig};
use transport::{HttpTransport, InMemoryTransport, Transport};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let dir = config_dir();
    let config = AppConfig::load(&dir)?;
    println!("{}", config);

    let registry = Arc::new(config.anchor_registry()?);
    let radio = match config.replay_path(&dir) {
        Some(path) => ReplayRadio::from_file(path)?,
        None => {
            tracing::warn!("No radio.replay_file configured, scanning will report nothing");
            ReplayRadio::new(vec![])
        }
    };
    let session = config.session_config();

    match config.uplink.mode {
        TransportMode::Http => {
            let base_url = config
                .uplink
                .base_url
                .as_ref()
                .context("uplink.base_url is required in http mode")?;
            let transport = HttpTransport::new(
                base_url,
                &config.uplink.endpoint_path,
                session.uplink.request_timeout,
            )?;
            tracing::info!("Delivering to {}", transport.endpoint());
            run_session(session, registry, radio, Arc::new(transport)).await
        }
        TransportMode::Offline => {
            tracing::info!("Offline mode, deliveries are kept in memory");
            let transport = Arc::new(InMemoryTransport::new());
            run_session(session, registry, radio, transport.clone()).await?;
            tracing::info!(
                "Offline transport recorded {} observation(s)",
                transport.delivered().len()
            );
            Ok(())
        }
    }
}

async fn run_session<R: RadioScanner, T: Transport>(
    session: SessionConfig,
    registry: Arc<AnchorRegistry>,
    radio: R,
    transport: Arc<T>,
) -> anyhow::Result<()> {
    let (mut orchestrator, status_rx) = Orchestrator::new(session, registry, radio, transport);
    let printer = tokio::spawn(print_status(status_rx));

    orchestrator.start();
    shutdown_signal().await;

    if let Some(report) = orchestrator.stop().await {
        tracing::info!("Uplink report: {:?}", report);
    }
    tracing::info!("\n{}", orchestrator.get_status_table());

    // Closing the status channel ends the printer
    drop(orchestrator);
    printer.await.context("Status printer failed")?;
    Ok(())
}

async fn print_status(mut status_rx: StatusReceiver) {
    while let Some(event) = status_rx.recv().await {
        println!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), event);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, stopping");
        },
        _ = terminate => {
            tracing::info!("SIGTERM received, stopping");
        },
    }
}
