//! UDP contact listener
//!
//! [`ContactIngestor`] turns one datagram into store writes and events;
//! [`UdpIngestServer`] receives datagrams, hands them to the ingestor and
//! repeats accepted ones to the configured targets.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use field_store::{
    topics, BandActivityUpdate, ContextEvent, ContextLevel, CreateOutcome, LogEntryId, NewLogEntry,
    Publisher, Store,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::contact::{NormalizedContact, UNKNOWN_STATION};
use crate::error::IngestError;
use crate::parser::parse_payload;
use crate::targets::ForwardTarget;

/// Largest datagram accepted
const MAX_DATAGRAM: usize = 65_535;

/// Characters of the raw payload kept with a log entry
const RAW_PAYLOAD_LIMIT: usize = 2000;

/// Characters of a rejected payload kept in its context event
const REJECTED_PAYLOAD_LIMIT: usize = 200;

/// UDP listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub host: String,
    pub port: u16,
    /// Every accepted datagram is repeated to these targets
    pub targets: Vec<ForwardTarget>,
    pub contest_id: Option<String>,
    pub club_id: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2237,
            targets: Vec::new(),
            contest_id: None,
            club_id: None,
        }
    }
}

impl IngestConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What happened to one datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new log entry was written
    Created(LogEntryId),
    /// The contact was already logged
    Duplicate,
    /// Callsign, band or mode was missing
    Rejected,
}

impl IngestOutcome {
    /// Whether the datagram carried a usable contact
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Persists contacts decoded from datagrams
pub struct ContactIngestor<S, P> {
    store: Arc<S>,
    publisher: Arc<P>,
    contest_id: Option<String>,
    club_id: Option<String>,
}

impl<S: Store, P: Publisher> ContactIngestor<S, P> {
    pub fn new(store: Arc<S>, publisher: Arc<P>) -> Self {
        Self {
            store,
            publisher,
            contest_id: None,
            club_id: None,
        }
    }

    /// Scope dedupe keys to a contest and club
    pub fn with_scope(mut self, contest_id: Option<String>, club_id: Option<String>) -> Self {
        self.contest_id = contest_id;
        self.club_id = club_id;
        self
    }

    /// Ingest one datagram received from `sender`
    pub async fn ingest(&self, payload: &str, sender: IpAddr) -> Result<IngestOutcome, IngestError> {
        self.ingest_at(payload, sender, Utc::now()).await
    }

    /// Ingest with an explicit clock for missing dates and times
    pub async fn ingest_at(
        &self,
        payload: &str,
        sender: IpAddr,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, IngestError> {
        let fields = parse_payload(payload);
        let Some(contact) = NormalizedContact::from_fields(&fields, now) else {
            self.reject(payload, sender).await;
            return Ok(IngestOutcome::Rejected);
        };

        let station = self.store.find_or_create_station(&contact.station_call).await?;
        let entry = NewLogEntry {
            station_id: station.id,
            callsign: contact.callsign.clone(),
            band: contact.band.clone(),
            mode: contact.mode.clone(),
            qso_date: contact.qso_date,
            qso_time: contact.qso_time.clone(),
            frequency: contact.frequency.clone(),
            rst_sent: contact.rst_sent.clone(),
            rst_rcvd: contact.rst_rcvd.clone(),
            power: contact.power,
            points: contact.points.unwrap_or(0),
            name: contact.name.clone(),
            state: contact.state.clone(),
            grid: contact.grid.clone(),
            source: "udp".to_string(),
            dedupe_key: contact.dedupe_key(self.contest_id.as_deref(), self.club_id.as_deref()),
            raw_payload: Some(truncate(payload, RAW_PAYLOAD_LIMIT)),
        };

        let outcome = match self.store.create_log_entry(entry).await? {
            CreateOutcome::Created(id) => IngestOutcome::Created(id),
            CreateOutcome::Duplicate => {
                debug!(
                    "Duplicate contact {} from {}, not logged again",
                    contact.callsign, contact.station_call
                );
                IngestOutcome::Duplicate
            }
        };

        if let Err(e) = self
            .store
            .append_band_activity(station.id, BandActivityUpdate::new(&contact.band, &contact.mode))
            .await
        {
            warn!("Failed to record band activity for {}: {}", station.callsign, e);
        }
        if let Err(e) = self
            .store
            .upsert_network_status(station.id, true, Some(sender.to_string()))
            .await
        {
            warn!("Failed to update network status of {}: {}", station.callsign, e);
        }
        let event = ContextEvent::new(
            Some(station.id),
            ContextLevel::Info,
            "UDP",
            format!(
                "UDP log entry received: {} {} {}",
                contact.callsign, contact.band, contact.mode
            ),
        );
        if let Err(e) = self.store.record_context_event(event).await {
            warn!("Failed to record UDP event for {}: {}", station.callsign, e);
        }

        if let IngestOutcome::Created(id) = outcome {
            info!(
                "Logged {} on {} {} for {}",
                contact.callsign, contact.band, contact.mode, station.callsign
            );
            self.publisher.publish(
                topics::LOGS,
                topics::LOG_ENTRY_CREATED,
                json!({
                    "id": id.0,
                    "stationId": station.id.as_u64(),
                    "stationCall": station.callsign,
                    "callsign": contact.callsign,
                    "band": contact.band,
                    "mode": contact.mode,
                    "qsoDate": contact.qso_date.format("%Y-%m-%d").to_string(),
                    "qsoTime": contact.qso_time,
                    "source": "udp",
                }),
            );
        }

        Ok(outcome)
    }

    async fn reject(&self, payload: &str, sender: IpAddr) {
        warn!("UDP payload from {} missing required fields", sender);

        let station = match self.store.find_or_create_station(UNKNOWN_STATION).await {
            Ok(station) => station,
            Err(e) => {
                warn!("Failed to resolve {}: {}", UNKNOWN_STATION, e);
                return;
            }
        };
        let event = ContextEvent::new(
            Some(station.id),
            ContextLevel::Warn,
            "UDP",
            format!(
                "UDP payload missing required fields: {}",
                truncate(payload, REJECTED_PAYLOAD_LIMIT)
            ),
        );
        if let Err(e) = self.store.record_context_event(event).await {
            warn!("Failed to record rejected UDP payload: {}", e);
        }
    }
}

/// A bound UDP contact listener
pub struct UdpIngestServer<S, P> {
    socket: UdpSocket,
    ingestor: ContactIngestor<S, P>,
    targets: Vec<ForwardTarget>,
}

impl<S: Store, P: Publisher> UdpIngestServer<S, P> {
    /// Bind the listen socket
    pub async fn bind(
        config: &IngestConfig,
        store: Arc<S>,
        publisher: Arc<P>,
    ) -> Result<Self, IngestError> {
        let addr = config.address();
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|source| IngestError::Bind { addr, source })?;

        Ok(Self {
            socket,
            ingestor: ContactIngestor::new(store, publisher)
                .with_scope(config.contest_id.clone(), config.club_id.clone()),
            targets: config.targets.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, IngestError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive datagrams until the task is cancelled
    pub async fn run(self) -> Result<(), IngestError> {
        info!("UDP log listener on {}", self.socket.local_addr()?);
        for target in &self.targets {
            info!("Repeating UDP log entries to {}", target);
        }

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, sender) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("UDP receive failed: {}", e);
                    continue;
                }
            };
            let datagram = &buf[..n];
            let payload = String::from_utf8_lossy(datagram);
            debug!(
                "IN <-udp({}) {}",
                sender,
                payload.chars().take(64).collect::<String>()
            );

            match self.ingestor.ingest(&payload, sender.ip()).await {
                Ok(outcome) if outcome.is_accepted() => self.repeat(datagram).await,
                Ok(_) => {}
                Err(e) => warn!("Failed to ingest UDP payload from {}: {}", sender, e),
            }
        }
    }

    async fn repeat(&self, datagram: &[u8]) {
        for target in &self.targets {
            if let Err(e) = self
                .socket
                .send_to(datagram, (target.host.as_str(), target.port))
                .await
            {
                warn!("Failed to repeat UDP payload to {}: {}", target, e);
            }
        }
    }
}
