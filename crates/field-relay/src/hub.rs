//! Relay Hub
//!
//! The hub owns every peer session. Socket tasks never touch sessions
//! directly; they send [`HubCommand`]s to [`run_hub`], which handles them one
//! at a time in arrival order. Outbound frames go to each peer's writer task
//! through a bounded channel, and a peer that stops draining it loses frames
//! rather than stalling the hub.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use field_store::{
    topics, BandActivityUpdate, ContextEvent, ContextLevel, OperatorMessage, Publisher, Station,
    Store,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::codec::{decode_body, encode_frame, RelayFrameCodec};
use crate::message::{
    announcement, RelayMessage, BROADCAST_RECIPIENT, NTWK_CHECK_ACK, NTWK_OPEN_ACK, UNKNOWN_FIELD,
    WHO_ACK,
};

/// Identifies one TCP peer for the lifetime of its connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Commands processed by the hub actor
#[derive(Debug)]
pub enum HubCommand {
    /// A peer connected; `outbound` feeds its writer task
    Connected {
        peer: PeerId,
        addr: SocketAddr,
        outbound: mpsc::Sender<Vec<u8>>,
    },
    /// Raw bytes read from a peer
    Bytes { peer: PeerId, data: Vec<u8> },
    /// A peer's socket closed
    Disconnected { peer: PeerId },
}

struct PeerSession {
    addr: SocketAddr,
    outbound: mpsc::Sender<Vec<u8>>,
    codec: RelayFrameCodec,
    station: Option<Station>,
    band: String,
    mode: String,
}

/// State of all connected relay peers
pub struct RelayHub<S, P> {
    store: Arc<S>,
    publisher: Arc<P>,
    peers: BTreeMap<PeerId, PeerSession>,
}

impl<S: Store, P: Publisher> RelayHub<S, P> {
    pub fn new(store: Arc<S>, publisher: Arc<P>) -> Self {
        Self {
            store,
            publisher,
            peers: BTreeMap::new(),
        }
    }

    /// Number of connected peers
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Callsign a peer has announced, if any
    pub fn peer_callsign(&self, peer: PeerId) -> Option<&str> {
        self.peers
            .get(&peer)?
            .station
            .as_ref()
            .map(|s| s.callsign.as_str())
    }

    /// Dispatch one command
    pub async fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connected {
                peer,
                addr,
                outbound,
            } => self.handle_connect(peer, addr, outbound).await,
            HubCommand::Bytes { peer, data } => self.handle_bytes(peer, &data).await,
            HubCommand::Disconnected { peer } => self.handle_disconnect(peer).await,
        }
    }

    /// Register a new peer
    pub async fn handle_connect(
        &mut self,
        peer: PeerId,
        addr: SocketAddr,
        outbound: mpsc::Sender<Vec<u8>>,
    ) {
        info!("New relay connection from {} ({})", addr, peer);
        self.peers.insert(
            peer,
            PeerSession {
                addr,
                outbound,
                codec: RelayFrameCodec::new(),
                station: None,
                band: String::new(),
                mode: String::new(),
            },
        );

        let event = ContextEvent::new(
            None,
            ContextLevel::Info,
            "NETWORK",
            format!("New relay connection from {}", addr.ip()),
        );
        if let Err(e) = self.store.record_context_event(event).await {
            warn!("Failed to record connection of {}: {}", peer, e);
        }
    }

    /// Feed bytes read from a peer through its codec and handle every
    /// complete frame
    pub async fn handle_bytes(&mut self, peer: PeerId, data: &[u8]) {
        let frames: Vec<Vec<u8>> = match self.peers.get_mut(&peer) {
            Some(session) => {
                session.codec.push_bytes(data);
                std::iter::from_fn(|| session.codec.next_frame()).collect()
            }
            None => {
                debug!("Dropping {} bytes from unknown {}", data.len(), peer);
                return;
            }
        };

        for frame in frames {
            self.handle_frame(peer, frame).await;
        }
    }

    /// Forget a peer and mark its station disconnected
    pub async fn handle_disconnect(&mut self, peer: PeerId) {
        let Some(session) = self.peers.remove(&peer) else {
            return;
        };
        info!("Relay connection from {} ({}) closed", session.addr, peer);

        let Some(station) = session.station else {
            return;
        };

        let event = ContextEvent::new(
            Some(station.id),
            ContextLevel::Warn,
            "NETWORK",
            "Station disconnected from relay",
        );
        if let Err(e) = self.store.record_context_event(event).await {
            warn!("Failed to record disconnect of {}: {}", station.callsign, e);
        }

        self.set_network_status(&station, false, session.addr.ip().to_string())
            .await;
    }

    async fn set_network_status(&self, station: &Station, connected: bool, ip: String) {
        if let Err(e) = self
            .store
            .upsert_network_status(station.id, connected, Some(ip))
            .await
        {
            warn!("Failed to update network status of {}: {}", station.callsign, e);
        }

        self.publisher.publish(
            topics::STATIONS,
            topics::NETWORK_STATUS,
            json!({
                "stationId": station.id.as_u64(),
                "callsign": station.callsign,
                "connected": connected,
            }),
        );
    }

    async fn handle_frame(&mut self, peer: PeerId, frame: Vec<u8>) {
        let body = decode_body(&frame);
        if body.is_empty() {
            debug!("Relaying empty frame ({} bytes) from {}", frame.len(), peer);
            self.rebroadcast(peer, &frame);
            return;
        }
        debug!("IN <-{} {}", peer, body.chars().take(64).collect::<String>());

        match RelayMessage::parse(&body) {
            RelayMessage::Announcement {
                station,
                band,
                mode,
            } => self.on_announcement(peer, &frame, station, band, mode).await,
            RelayMessage::DirectMessage { from, to, text } => {
                self.on_message(peer, from, to, text).await
            }
            RelayMessage::Broadcast { from, text } => {
                self.on_message(peer, from, BROADCAST_RECIPIENT.to_string(), text)
                    .await
            }
            RelayMessage::RosterQuery => self.on_roster_query(peer),
            RelayMessage::NetworkCheck => self.send(peer, encode_frame(NTWK_CHECK_ACK)),
            RelayMessage::NetworkOpen => self.send(peer, encode_frame(NTWK_OPEN_ACK)),
            RelayMessage::Other => {}
        }

        self.rebroadcast(peer, &frame);
    }

    async fn on_announcement(
        &mut self,
        peer: PeerId,
        frame: &[u8],
        callsign: String,
        band: String,
        mode: String,
    ) {
        self.send(peer, frame.to_vec());

        let station = match self.store.find_or_create_station(&callsign).await {
            Ok(station) => station,
            Err(e) => {
                warn!("Failed to resolve station {}: {}", callsign, e);
                return;
            }
        };

        let Some(session) = self.peers.get_mut(&peer) else {
            return;
        };
        let identified = session.station.as_ref().map(|s| s.id) != Some(station.id);
        let changed = identified || session.band != band || session.mode != mode;
        if !changed {
            return;
        }
        let previous = session.station.replace(station.clone());
        session.band = band.clone();
        session.mode = mode.clone();
        let ip = session.addr.ip().to_string();

        info!("{} is {} on {}m {}", peer, station.callsign, band, mode);

        if let Some(previous) = previous.filter(|p| p.id != station.id) {
            info!("{} no longer {}", peer, previous.callsign);
            self.set_network_status(&previous, false, ip.clone()).await;
        }

        if identified {
            self.set_network_status(&station, true, ip).await;
        } else if let Err(e) = self
            .store
            .upsert_network_status(station.id, true, Some(ip))
            .await
        {
            warn!("Failed to update network status of {}: {}", station.callsign, e);
        }

        // Station-only announcements identify the peer but carry no band
        if band.is_empty() || mode.is_empty() {
            return;
        }

        if let Err(e) = self
            .store
            .append_band_activity(station.id, BandActivityUpdate::new(&band, &mode))
            .await
        {
            warn!("Failed to record band activity for {}: {}", station.callsign, e);
        }

        let event = ContextEvent::new(
            Some(station.id),
            ContextLevel::Info,
            "BAND_CHANGE",
            format!("Changed to {}m {}", band, mode),
        );
        if let Err(e) = self.store.record_context_event(event).await {
            warn!("Failed to record band change of {}: {}", station.callsign, e);
        }

        self.publisher.publish(
            topics::STATIONS,
            topics::BAND_CHANGE,
            json!({
                "stationId": station.id.as_u64(),
                "callsign": station.callsign,
                "band": band,
                "mode": mode,
                "source": "relay",
            }),
        );
    }

    async fn on_message(&mut self, peer: PeerId, from: String, to: String, text: String) {
        let Some(station) = self.peers.get(&peer).and_then(|s| s.station.clone()) else {
            warn!("Message from {} before any announcement, not stored", peer);
            return;
        };

        let from_call = if from.is_empty() {
            station.callsign.clone()
        } else {
            from
        };
        let message = OperatorMessage {
            from_station: station.id,
            from_call,
            to_call: to,
            content: text,
        };

        if let Err(e) = self.store.create_operator_message(message.clone()).await {
            warn!("Failed to store message from {}: {}", message.from_call, e);
            return;
        }

        self.publisher.publish(
            topics::MESSAGES,
            topics::MESSAGE_NEW,
            json!({
                "fromStationId": message.from_station.as_u64(),
                "fromCall": message.from_call,
                "toCall": message.to_call,
                "content": message.content,
            }),
        );
    }

    fn on_roster_query(&self, peer: PeerId) {
        self.send(peer, encode_frame(WHO_ACK));

        for (other, session) in &self.peers {
            if *other == peer {
                continue;
            }
            let Some(station) = &session.station else {
                continue;
            };
            let band = or_unknown(&session.band);
            let mode = or_unknown(&session.mode);
            self.send(
                peer,
                encode_frame(&announcement(&station.callsign, band, mode)),
            );
        }
    }

    fn rebroadcast(&self, from: PeerId, frame: &[u8]) {
        for other in self.peers.keys().filter(|p| **p != from) {
            self.send(*other, frame.to_vec());
        }
    }

    fn send(&self, peer: PeerId, frame: Vec<u8>) {
        let Some(session) = self.peers.get(&peer) else {
            return;
        };
        match session.outbound.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("{} is not keeping up, frame dropped", peer),
            Err(TrySendError::Closed(_)) => debug!("{} writer closed, frame dropped", peer),
        }
    }
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        UNKNOWN_FIELD
    } else {
        value
    }
}

/// Run the hub until every command sender is gone
pub async fn run_hub<S: Store, P: Publisher>(
    mut hub: RelayHub<S, P>,
    mut rx: mpsc::Receiver<HubCommand>,
) {
    info!("Relay hub started");
    while let Some(command) = rx.recv().await {
        hub.handle(command).await;
    }
    info!("Relay hub stopped");
}
