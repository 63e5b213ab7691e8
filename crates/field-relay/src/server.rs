//! TCP front end of the relay
//!
//! Each accepted socket is split into a reader task, which forwards raw bytes
//! to the hub, and a writer task, which drains the peer's outbound channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use field_store::{Publisher, Store};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::hub::{run_hub, HubCommand, PeerId, RelayHub};

/// Depth of the command channel in front of the hub
const HUB_CHANNEL_CAPACITY: usize = 1024;

const READ_BUFFER_SIZE: usize = 4096;

/// Pause after a failed accept
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Relay listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Outbound frames buffered per peer before frames are dropped
    pub peer_queue_depth: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10000,
            peer_queue_depth: 256,
        }
    }
}

impl RelayConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A bound relay listener
pub struct RelayServer<S, P> {
    listener: TcpListener,
    hub: RelayHub<S, P>,
    peer_queue_depth: usize,
}

impl<S: Store, P: Publisher> RelayServer<S, P> {
    /// Bind the listen socket
    pub async fn bind(
        config: &RelayConfig,
        store: Arc<S>,
        publisher: Arc<P>,
    ) -> Result<Self, RelayError> {
        let addr = config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;

        Ok(Self {
            listener,
            hub: RelayHub::new(store, publisher),
            peer_queue_depth: config.peer_queue_depth.max(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept peers until the task is cancelled
    pub async fn run(self) -> Result<(), RelayError> {
        let Self {
            listener,
            hub,
            peer_queue_depth,
        } = self;

        info!("Relay listening on {}", listener.local_addr()?);

        let (hub_tx, hub_rx) = mpsc::channel(HUB_CHANNEL_CAPACITY);
        let hub_task = tokio::spawn(run_hub(hub, hub_rx));
        let mut next_peer = 0u64;

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Relay accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            next_peer += 1;
            let peer = PeerId(next_peer);
            if let Err(e) = stream.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
            }

            let (read, write) = stream.into_split();
            let (outbound_tx, outbound_rx) = mpsc::channel(peer_queue_depth);

            let connected = HubCommand::Connected {
                peer,
                addr,
                outbound: outbound_tx,
            };
            if hub_tx.send(connected).await.is_err() {
                warn!("Relay hub stopped, no longer accepting peers");
                break;
            }

            tokio::spawn(run_writer(peer, write, outbound_rx));
            tokio::spawn(run_reader(peer, read, hub_tx.clone()));
        }

        drop(hub_tx);
        let _ = hub_task.await;
        Ok(())
    }
}

async fn run_reader(peer: PeerId, mut read: OwnedReadHalf, hub: mpsc::Sender<HubCommand>) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match read.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let data = buf[..n].to_vec();
                if hub.send(HubCommand::Bytes { peer, data }).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("Read error on {}: {}", peer, e);
                break;
            }
        }
    }
    let _ = hub.send(HubCommand::Disconnected { peer }).await;
}

async fn run_writer(peer: PeerId, mut write: OwnedWriteHalf, mut outbound: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = write.write_all(&frame).await {
            debug!("Write error on {}: {}", peer, e);
            break;
        }
    }
    let _ = write.shutdown().await;
}
