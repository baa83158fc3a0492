//! parleyd — parley chat relay daemon.

use anyhow::Result;
use tokio::sync::broadcast;

use parley_core::config::{RelayConfig, TransportKind};
use parley_relay::{DatagramRelay, RelayEvent, StreamRelay};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = RelayConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = RelayConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RelayConfig::default()
    });

    let port = config.network.port;
    tracing::info!(transport = ?config.network.transport, port, "parleyd starting");

    let mut events = match config.network.transport {
        TransportKind::Tcp => {
            let relay = StreamRelay::new();
            let events = relay.subscribe();
            relay.start(port).await?;
            tokio::spawn(supervise_stream(relay));
            events
        }
        TransportKind::Udp => {
            let relay = DatagramRelay::new();
            let events = relay.subscribe();
            relay.start(port).await?;
            tokio::spawn(supervise_datagram(relay));
            events
        }
    };

    loop {
        match events.recv().await {
            Ok(RelayEvent::RosterChanged(names)) => {
                tracing::info!(count = names.len(), roster = names.join(","), "roster changed");
            }
            Ok(RelayEvent::Log(line)) => tracing::info!("{line}"),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    Ok(())
}

async fn supervise_stream(relay: StreamRelay) {
    wait_for_shutdown().await;
    relay.stop();
}

async fn supervise_datagram(relay: DatagramRelay) {
    wait_for_shutdown().await;
    relay.stop();
}

async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed");
        return;
    }
    tracing::info!("shutting down");
}
