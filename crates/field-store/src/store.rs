//! The store collaborator interface

use std::future::Future;

use crate::error::StoreError;
use crate::model::{
    BandActivityUpdate, ContextEvent, CreateOutcome, NewLogEntry, OperatorMessage, RadioConnection,
    RadioId, RadioState, Station, StationId,
};

/// Persistent store consumed by the gateway services
///
/// Implementations provide their own atomicity for individual writes. The
/// only multi-row unit is [`replace_band_activity`](Store::replace_band_activity),
/// which must leave exactly one band activity row for the station.
pub trait Store: Send + Sync + 'static {
    /// Look up a station by callsign, creating it if unknown
    fn find_or_create_station(
        &self,
        callsign: &str,
    ) -> impl Future<Output = Result<Station, StoreError>> + Send;

    /// Load a radio connection record
    fn radio_connection(
        &self,
        id: &RadioId,
    ) -> impl Future<Output = Result<Option<RadioConnection>, StoreError>> + Send;

    /// All radio connections with `enabled == true`
    fn enabled_radio_connections(
        &self,
    ) -> impl Future<Output = Result<Vec<RadioConnection>, StoreError>> + Send;

    /// Stations currently assigned to a radio
    fn stations_for_radio(
        &self,
        id: &RadioId,
    ) -> impl Future<Output = Result<Vec<StationId>, StoreError>> + Send;

    /// Overwrite the live state snapshot of a radio connection
    fn upsert_radio_state(
        &self,
        id: &RadioId,
        state: RadioState,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Add a band activity row (history)
    fn append_band_activity(
        &self,
        station: StationId,
        update: BandActivityUpdate,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Replace every band activity row of a station with a single new one
    fn replace_band_activity(
        &self,
        station: StationId,
        update: BandActivityUpdate,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Create or update the network status of a station
    fn upsert_network_status(
        &self,
        station: StationId,
        connected: bool,
        ip: Option<String>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persist an operator message
    fn create_operator_message(
        &self,
        message: OperatorMessage,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persist a log entry unless its dedupe key already exists
    fn create_log_entry(
        &self,
        entry: NewLogEntry,
    ) -> impl Future<Output = Result<CreateOutcome, StoreError>> + Send;

    /// Append a context event
    fn record_context_event(
        &self,
        event: ContextEvent,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
