//! Field Gateway
//!
//! Runs the device and peer integration services of the contest logger in one
//! process: radio sessions polling rigctld daemons, the N3FJP relay for
//! logging clients and the UDP contact listener. All of them write to one
//! store and publish on one channel.

mod settings;

use std::sync::Arc;

use anyhow::Context;
use field_ingest::UdpIngestServer;
use field_radio::{DefaultRigFactory, RadioSessionManager};
use field_relay::RelayServer;
use field_store::{MemoryStore, TracingPublisher};
use settings::Settings;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "field_gateway=info,field_rigctl=info,field_radio=info,field_relay=info,field_ingest=info,field_store=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting field gateway");

    let settings = Settings::load();
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(TracingPublisher);

    for radio in &settings.radios {
        store.insert_radio_connection(radio.clone());
    }

    let relay = RelayServer::bind(&settings.relay, store.clone(), publisher.clone())
        .await
        .context("starting relay")?;
    let ingest = UdpIngestServer::bind(&settings.ingest, store.clone(), publisher.clone())
        .await
        .context("starting UDP listener")?;

    let manager = RadioSessionManager::new(
        store.clone(),
        publisher.clone(),
        DefaultRigFactory::new(settings.rigctl.clone()),
        settings.sessions.clone(),
    );
    let started = manager
        .start_all()
        .await
        .context("starting radio sessions")?;
    info!("Started {} of {} radio sessions", started, settings.radios.len());

    let result = tokio::select! {
        result = relay.run() => result.context("relay stopped"),
        result = ingest.run() => result.context("UDP listener stopped"),
        result = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            result.context("waiting for shutdown signal")
        }
    };

    manager.stop_all().await;
    result
}
