//! In-memory store
//!
//! Mirrors the constraints of the real persistence layer that the gateway
//! relies on: station callsigns are unique, log entry dedupe keys are unique,
//! and a station has at most one network status row.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;
use tracing::debug;

use crate::error::StoreError;
use crate::model::{
    BandActivity, BandActivityUpdate, ContextEvent, CreateOutcome, LogEntry, LogEntryId,
    NetworkStatus, NewLogEntry, OperatorMessage, RadioConnection, RadioId, RadioState, Station,
    StationId,
};
use crate::store::Store;

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    stations: BTreeMap<StationId, Station>,
    callsigns: HashMap<String, StationId>,
    radios: BTreeMap<RadioId, RadioConnection>,
    assignments: HashMap<RadioId, Vec<StationId>>,
    band_activity: Vec<BandActivity>,
    network: HashMap<StationId, NetworkStatus>,
    messages: Vec<OperatorMessage>,
    log_entries: Vec<LogEntry>,
    dedupe_keys: HashSet<String>,
    context: Vec<ContextEvent>,
    unavailable: bool,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            Err(StoreError::Unavailable("store marked unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn ensure_station(&self, station: StationId) -> Result<(), StoreError> {
        if self.stations.contains_key(&station) {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                kind: "station",
                id: station.to_string(),
            })
        }
    }

    fn band_row(&mut self, station: StationId, update: BandActivityUpdate) -> BandActivity {
        BandActivity {
            id: self.next_id(),
            station_id: station,
            band: update.band,
            mode: update.mode,
            frequency_hz: update.frequency_hz,
            power_pct: update.power_pct,
            recorded_at: Utc::now(),
        }
    }
}

/// A [`Store`] kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))?;
        f(&mut inner)
    }

    fn read<T: Default>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        self.inner.lock().map(|inner| f(&inner)).unwrap_or_default()
    }

    /// Make every subsequent write fail with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.unavailable = unavailable;
        }
    }

    /// Add or replace a radio connection record
    pub fn insert_radio_connection(&self, connection: RadioConnection) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.radios.insert(connection.id.clone(), connection);
        }
    }

    /// Assign a station to a radio
    pub fn assign_station(&self, radio: &RadioId, station: StationId) {
        if let Ok(mut inner) = self.inner.lock() {
            let stations = inner.assignments.entry(radio.clone()).or_default();
            if !stations.contains(&station) {
                stations.push(station);
            }
        }
    }

    pub fn station_by_callsign(&self, callsign: &str) -> Option<Station> {
        self.read(|inner| {
            inner
                .callsigns
                .get(callsign)
                .and_then(|id| inner.stations.get(id))
                .cloned()
        })
    }

    pub fn radio_state(&self, id: &RadioId) -> Option<RadioState> {
        self.read(|inner| inner.radios.get(id).map(|r| r.state.clone()))
    }

    pub fn band_activities(&self, station: StationId) -> Vec<BandActivity> {
        self.read(|inner| {
            inner
                .band_activity
                .iter()
                .filter(|a| a.station_id == station)
                .cloned()
                .collect()
        })
    }

    pub fn network_status(&self, station: StationId) -> Option<NetworkStatus> {
        self.read(|inner| inner.network.get(&station).cloned())
    }

    pub fn operator_messages(&self) -> Vec<OperatorMessage> {
        self.read(|inner| inner.messages.clone())
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.read(|inner| inner.log_entries.clone())
    }

    pub fn context_events(&self) -> Vec<ContextEvent> {
        self.read(|inner| inner.context.clone())
    }
}

impl Store for MemoryStore {
    async fn find_or_create_station(&self, callsign: &str) -> Result<Station, StoreError> {
        self.with(|inner| {
            if let Some(station) = inner.callsigns.get(callsign).and_then(|id| inner.stations.get(id)) {
                return Ok(station.clone());
            }
            inner.ensure_available()?;
            let station = Station {
                id: StationId(inner.next_id()),
                callsign: callsign.to_string(),
                name: callsign.to_string(),
            };
            inner.callsigns.insert(station.callsign.clone(), station.id);
            inner.stations.insert(station.id, station.clone());
            debug!(callsign, id = station.id.0, "created station");
            Ok(station)
        })
    }

    async fn radio_connection(&self, id: &RadioId) -> Result<Option<RadioConnection>, StoreError> {
        self.with(|inner| Ok(inner.radios.get(id).cloned()))
    }

    async fn enabled_radio_connections(&self) -> Result<Vec<RadioConnection>, StoreError> {
        self.with(|inner| Ok(inner.radios.values().filter(|r| r.enabled).cloned().collect()))
    }

    async fn stations_for_radio(&self, id: &RadioId) -> Result<Vec<StationId>, StoreError> {
        self.with(|inner| Ok(inner.assignments.get(id).cloned().unwrap_or_default()))
    }

    async fn upsert_radio_state(&self, id: &RadioId, state: RadioState) -> Result<(), StoreError> {
        self.with(|inner| {
            inner.ensure_available()?;
            let radio = inner.radios.get_mut(id).ok_or_else(|| StoreError::NotFound {
                kind: "radio connection",
                id: id.to_string(),
            })?;
            radio.state = state;
            Ok(())
        })
    }

    async fn append_band_activity(
        &self,
        station: StationId,
        update: BandActivityUpdate,
    ) -> Result<(), StoreError> {
        self.with(|inner| {
            inner.ensure_available()?;
            inner.ensure_station(station)?;
            let row = inner.band_row(station, update);
            inner.band_activity.push(row);
            Ok(())
        })
    }

    async fn replace_band_activity(
        &self,
        station: StationId,
        update: BandActivityUpdate,
    ) -> Result<(), StoreError> {
        self.with(|inner| {
            inner.ensure_available()?;
            inner.ensure_station(station)?;
            let row = inner.band_row(station, update);
            inner.band_activity.retain(|a| a.station_id != station);
            inner.band_activity.push(row);
            Ok(())
        })
    }

    async fn upsert_network_status(
        &self,
        station: StationId,
        connected: bool,
        ip: Option<String>,
    ) -> Result<(), StoreError> {
        self.with(|inner| {
            inner.ensure_available()?;
            inner.ensure_station(station)?;
            let now = Utc::now();
            let status = inner.network.entry(station).or_insert(NetworkStatus {
                station_id: station,
                connected,
                ip: None,
                last_connected: None,
            });
            status.connected = connected;
            if connected {
                status.last_connected = Some(now);
            }
            if ip.is_some() {
                status.ip = ip;
            }
            Ok(())
        })
    }

    async fn create_operator_message(&self, message: OperatorMessage) -> Result<(), StoreError> {
        self.with(|inner| {
            inner.ensure_available()?;
            inner.ensure_station(message.from_station)?;
            inner.messages.push(message);
            Ok(())
        })
    }

    async fn create_log_entry(&self, entry: NewLogEntry) -> Result<CreateOutcome, StoreError> {
        self.with(|inner| {
            inner.ensure_available()?;
            inner.ensure_station(entry.station_id)?;
            if !inner.dedupe_keys.insert(entry.dedupe_key.clone()) {
                debug!(key = %entry.dedupe_key, "duplicate log entry");
                return Ok(CreateOutcome::Duplicate);
            }
            let id = LogEntryId(inner.next_id());
            inner.log_entries.push(LogEntry {
                id,
                entry,
                created_at: Utc::now(),
            });
            Ok(CreateOutcome::Created(id))
        })
    }

    async fn record_context_event(&self, event: ContextEvent) -> Result<(), StoreError> {
        self.with(|inner| {
            inner.ensure_available()?;
            inner.context.push(event);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::model::ContextLevel;

    fn entry(station: StationId, key: &str) -> NewLogEntry {
        NewLogEntry {
            station_id: station,
            callsign: "K1LI".into(),
            band: "20".into(),
            mode: "CW".into(),
            qso_date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            qso_time: "12:34:56".into(),
            frequency: None,
            rst_sent: None,
            rst_rcvd: None,
            power: None,
            points: 0,
            name: None,
            state: None,
            grid: None,
            source: "test".into(),
            dedupe_key: key.into(),
            raw_payload: None,
        }
    }

    #[tokio::test]
    async fn stations_are_unique_by_callsign() {
        let store = MemoryStore::new();
        let a = store.find_or_create_station("W1AW").await.unwrap();
        let b = store.find_or_create_station("W1AW").await.unwrap();
        let c = store.find_or_create_station("N7UF").await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a.id, c.id);
        assert_eq!(store.station_by_callsign("N7UF").unwrap().name, "N7UF");
    }

    #[tokio::test]
    async fn duplicate_dedupe_key_is_not_an_error() {
        let store = MemoryStore::new();
        let station = store.find_or_create_station("W1AW").await.unwrap();

        let first = store.create_log_entry(entry(station.id, "k")).await.unwrap();
        let second = store.create_log_entry(entry(station.id, "k")).await.unwrap();

        assert!(matches!(first, CreateOutcome::Created(_)));
        assert!(second.is_duplicate());
        assert_eq!(store.log_entries().len(), 1);
    }

    #[tokio::test]
    async fn replace_keeps_a_single_band_activity_row() {
        let store = MemoryStore::new();
        let station = store.find_or_create_station("W1AW").await.unwrap();

        store
            .append_band_activity(station.id, BandActivityUpdate::new("40", "CW"))
            .await
            .unwrap();
        store
            .append_band_activity(station.id, BandActivityUpdate::new("20", "CW"))
            .await
            .unwrap();
        assert_eq!(store.band_activities(station.id).len(), 2);

        store
            .replace_band_activity(station.id, BandActivityUpdate::new("15", "PHONE"))
            .await
            .unwrap();
        let rows = store.band_activities(station.id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].band, "15");
    }

    #[tokio::test]
    async fn network_status_keeps_last_ip_and_connection_time() {
        let store = MemoryStore::new();
        let station = store.find_or_create_station("W1AW").await.unwrap();

        store
            .upsert_network_status(station.id, true, Some("10.0.0.7".into()))
            .await
            .unwrap();
        store
            .upsert_network_status(station.id, false, None)
            .await
            .unwrap();

        let status = store.network_status(station.id).unwrap();
        assert!(!status.connected);
        assert_eq!(status.ip.as_deref(), Some("10.0.0.7"));
        assert!(status.last_connected.is_some());
    }

    #[tokio::test]
    async fn unavailable_store_rejects_writes() {
        let store = MemoryStore::new();
        let station = store.find_or_create_station("W1AW").await.unwrap();
        store.set_unavailable(true);

        let err = store.create_log_entry(entry(station.id, "k")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        let err = store
            .record_context_event(ContextEvent::new(None, ContextLevel::Info, "UDP", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn radio_state_requires_known_connection() {
        let store = MemoryStore::new();
        let id = RadioId::new("nope");
        let err = store
            .upsert_radio_state(&id, RadioState::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        store.insert_radio_connection(RadioConnection::simulated("sim"));
        store
            .upsert_radio_state(
                &RadioId::new("sim"),
                RadioState {
                    connected: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(store.radio_state(&RadioId::new("sim")).unwrap().connected);
    }
}
