//! Session manager tests driven by simulated radios

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use field_radio::{
    AnyRig, PollOutcome, RadioSessionManager, RigFactory, SessionConfig, SessionError,
    FAILED_TO_CONNECT,
};
use field_rigctl::Rig;
use field_sim::{SimConfig, SimulatedRig};
use field_store::{
    topics, MemoryStore, RadioConnection, RadioId, RecordingPublisher, StationId, Store,
};

/// Hands out shared simulator handles so tests can steer the radios
#[derive(Clone, Default)]
struct SimFactory {
    rigs: Arc<Mutex<HashMap<RadioId, SimulatedRig>>>,
}

impl SimFactory {
    fn rig(&self, id: &RadioId) -> SimulatedRig {
        self.rigs
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_insert_with(|| SimulatedRig::new(id.as_str()))
            .clone()
    }

    fn insert(&self, id: &RadioId, rig: SimulatedRig) {
        self.rigs.lock().unwrap().insert(id.clone(), rig);
    }
}

impl RigFactory for SimFactory {
    fn create(&self, connection: &RadioConnection) -> AnyRig {
        AnyRig::Simulated(self.rig(&connection.id))
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    publisher: Arc<RecordingPublisher>,
    factory: SimFactory,
    manager: RadioSessionManager<MemoryStore, RecordingPublisher, SimFactory>,
}

impl Harness {
    fn new(config: SessionConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let factory = SimFactory::default();
        let manager = RadioSessionManager::new(
            Arc::clone(&store),
            Arc::clone(&publisher),
            factory.clone(),
            config,
        );
        Self {
            store,
            publisher,
            factory,
            manager,
        }
    }

    /// Add a radio whose timer never fires during a test
    fn add_radio(&self, id: &str) -> RadioId {
        self.add_radio_polled_every(id, 3_600_000)
    }

    fn add_radio_polled_every(&self, id: &str, poll_interval_ms: u64) -> RadioId {
        let mut connection = RadioConnection::simulated(id);
        connection.poll_interval_ms = poll_interval_ms;
        self.store.insert_radio_connection(connection);
        RadioId::new(id)
    }

    async fn station_on(&self, radio: &RadioId, callsign: &str) -> StationId {
        let station = self.store.find_or_create_station(callsign).await.unwrap();
        self.store.assign_station(radio, station.id);
        station.id
    }
}

#[tokio::test]
async fn start_marks_radio_connected() {
    let h = Harness::new(SessionConfig::default());
    let id = h.add_radio("shack");

    assert!(h.manager.start(&id).await.unwrap());
    assert!(h.manager.is_active(&id));

    let state = h.store.radio_state(&id).unwrap();
    assert!(state.connected);
    assert!(state.last_error.is_none());
    assert!(state.last_seen.is_some());

    let events = h.publisher.events_named(topics::RADIO_STATE);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].topic, topics::RADIOS);
    assert_eq!(events[0].payload["radioId"], "shack");
}

#[tokio::test]
async fn start_rejects_unknown_and_disabled() {
    let h = Harness::new(SessionConfig::default());
    assert!(matches!(
        h.manager.start(&RadioId::new("nope")).await,
        Err(SessionError::UnknownRadio(_))
    ));

    let mut connection = RadioConnection::simulated("off");
    connection.enabled = false;
    h.store.insert_radio_connection(connection);
    assert!(matches!(
        h.manager.start(&RadioId::new("off")).await,
        Err(SessionError::Disabled(_))
    ));
}

#[tokio::test]
async fn failed_connect_is_recorded() {
    let h = Harness::new(SessionConfig::default());
    let id = h.add_radio("shack");
    h.factory.rig(&id).set_fail_connect(true);

    assert!(!h.manager.start(&id).await.unwrap());
    assert!(!h.manager.is_active(&id));

    let state = h.store.radio_state(&id).unwrap();
    assert!(!state.connected);
    assert_eq!(state.last_error.as_deref(), Some(FAILED_TO_CONNECT));
}

#[tokio::test]
async fn second_start_is_a_no_op() {
    let h = Harness::new(SessionConfig::default());
    let id = h.add_radio("shack");

    assert!(h.manager.start(&id).await.unwrap());
    assert!(h.manager.start(&id).await.unwrap());
    assert_eq!(h.factory.rig(&id).connect_count(), 1);
}

#[tokio::test]
async fn poll_persists_state_and_band_changes() {
    let h = Harness::new(SessionConfig::default());
    let id = h.add_radio("shack");
    let station = h.station_on(&id, "K1LI").await;
    let rig = h.factory.rig(&id);
    h.manager.start(&id).await.unwrap();

    assert_eq!(
        h.manager.poll(&id).await,
        PollOutcome::Updated { band_changed: true }
    );
    let state = h.store.radio_state(&id).unwrap();
    assert_eq!(state.frequency_hz, Some(14_250_000));
    assert_eq!(state.mode.as_deref(), Some("USB"));
    assert_eq!(state.passband_hz, Some(3000));
    assert_eq!(state.power_pct, Some(50));

    let activity = h.store.band_activities(station);
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].band, "20");
    assert_eq!(activity[0].mode, "PHONE");
    assert_eq!(h.publisher.events_named(topics::BAND_CHANGE).len(), 1);

    // Same band, same category
    rig.tune(14_300_000, "LSB");
    assert_eq!(
        h.manager.poll(&id).await,
        PollOutcome::Updated { band_changed: false }
    );
    assert_eq!(h.publisher.events_named(topics::BAND_CHANGE).len(), 1);

    rig.tune(7_030_000, "CW");
    assert_eq!(
        h.manager.poll(&id).await,
        PollOutcome::Updated { band_changed: true }
    );
    let activity = h.store.band_activities(station);
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].band, "40");
    assert_eq!(activity[0].mode, "CW");
    assert_eq!(activity[0].frequency_hz, Some(7_030_000));

    let changes = h.publisher.events_named(topics::BAND_CHANGE);
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[1].payload["band"], "40");
    assert_eq!(changes[1].payload["stationId"], station.as_u64());
}

#[tokio::test]
async fn out_of_band_frequency_is_not_recorded() {
    let h = Harness::new(SessionConfig::default());
    let id = h.add_radio("shack");
    let station = h.station_on(&id, "K1LI").await;
    h.factory.rig(&id).tune(29_800_000, "FM");
    h.manager.start(&id).await.unwrap();

    assert_eq!(
        h.manager.poll(&id).await,
        PollOutcome::Updated { band_changed: false }
    );
    assert!(h.store.band_activities(station).is_empty());
    assert_eq!(
        h.store.radio_state(&id).unwrap().frequency_hz,
        Some(29_800_000)
    );
}

#[tokio::test]
async fn dropped_link_is_reconnected() {
    let h = Harness::new(SessionConfig::default());
    let id = h.add_radio("shack");
    let rig = h.factory.rig(&id);
    h.manager.start(&id).await.unwrap();

    rig.drop_link();
    assert!(matches!(
        h.manager.poll(&id).await,
        PollOutcome::Updated { .. }
    ));
    assert_eq!(rig.connect_count(), 2);
    assert_eq!(h.manager.reconnect_attempts(&id), Some(0));
}

#[tokio::test]
async fn successful_reconnect_resets_attempts() {
    let h = Harness::new(SessionConfig::default());
    let id = h.add_radio("shack");
    let rig = h.factory.rig(&id);
    h.manager.start(&id).await.unwrap();

    rig.drop_link();
    rig.set_fail_connect(true);
    assert_eq!(
        h.manager.poll(&id).await,
        PollOutcome::Reconnecting { attempt: 1 }
    );
    assert_eq!(h.manager.reconnect_attempts(&id), Some(1));
    let state = h.store.radio_state(&id).unwrap();
    assert!(!state.connected);
    assert!(state.last_error.is_some());

    rig.set_fail_connect(false);
    assert!(matches!(
        h.manager.poll(&id).await,
        PollOutcome::Updated { .. }
    ));
    assert_eq!(h.manager.reconnect_attempts(&id), Some(0));
    assert!(h.store.radio_state(&id).unwrap().connected);
}

#[tokio::test]
async fn exhausted_reconnects_stop_the_session() {
    let h = Harness::new(SessionConfig {
        max_reconnect_attempts: 2,
        ..Default::default()
    });
    let id = h.add_radio("shack");
    let rig = h.factory.rig(&id);
    h.manager.start(&id).await.unwrap();

    rig.drop_link();
    rig.set_fail_connect(true);
    assert_eq!(
        h.manager.poll(&id).await,
        PollOutcome::Reconnecting { attempt: 1 }
    );
    assert_eq!(
        h.manager.poll(&id).await,
        PollOutcome::Reconnecting { attempt: 2 }
    );
    assert_eq!(h.manager.poll(&id).await, PollOutcome::Exhausted);

    assert!(!h.manager.is_active(&id));
    assert_eq!(h.manager.poll(&id).await, PollOutcome::Inactive);

    let state = h.store.radio_state(&id).unwrap();
    assert!(!state.connected);
    assert!(state.last_error.unwrap().contains("after 2 attempts"));
    assert_eq!(h.publisher.events_named(topics::RADIO_STOPPED).len(), 1);
}

#[tokio::test]
async fn restart_gives_a_fresh_reconnect_budget() {
    let h = Harness::new(SessionConfig::default());
    let id = h.add_radio("shack");
    let rig = h.factory.rig(&id);
    h.manager.start(&id).await.unwrap();

    rig.drop_link();
    rig.set_fail_connect(true);
    h.manager.poll(&id).await;
    assert_eq!(h.manager.reconnect_attempts(&id), Some(1));

    rig.set_fail_connect(false);
    assert!(h.manager.restart(&id).await.unwrap());
    assert_eq!(h.manager.reconnect_attempts(&id), Some(0));
    assert!(rig.is_connected());
}

#[tokio::test]
async fn failing_reads_record_the_error() {
    let h = Harness::new(SessionConfig::default());
    let id = h.add_radio("shack");
    let rig = h.factory.rig(&id);
    h.manager.start(&id).await.unwrap();

    rig.set_fail_reads(true);
    assert_eq!(h.manager.poll(&id).await, PollOutcome::Failed);

    let state = h.store.radio_state(&id).unwrap();
    assert!(state.connected);
    assert!(state.last_error.is_some());
}

#[tokio::test]
async fn stop_marks_radio_disconnected() {
    let h = Harness::new(SessionConfig::default());
    let id = h.add_radio("shack");
    let rig = h.factory.rig(&id);
    h.manager.start(&id).await.unwrap();

    assert!(h.manager.stop(&id).await);
    assert!(!h.manager.is_active(&id));
    assert!(!rig.is_connected());
    assert!(!h.store.radio_state(&id).unwrap().connected);
    assert_eq!(h.publisher.events_named(topics::RADIO_STOPPED).len(), 1);

    assert!(!h.manager.stop(&id).await);
}

#[tokio::test]
async fn start_all_skips_disabled_connections() {
    let h = Harness::new(SessionConfig::default());
    h.add_radio("a");
    h.add_radio("b");
    let mut disabled = RadioConnection::simulated("c");
    disabled.enabled = false;
    h.store.insert_radio_connection(disabled);

    assert_eq!(h.manager.start_all().await.unwrap(), 2);
    assert_eq!(
        h.manager.active_radios(),
        vec![RadioId::new("a"), RadioId::new("b")]
    );

    h.manager.stop_all().await;
    assert!(h.manager.active_radios().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timer_polls_at_the_configured_interval() {
    let h = Harness::new(SessionConfig::default());
    let id = h.add_radio_polled_every("shack", 1000);
    let rig = h.factory.rig(&id);
    h.manager.start(&id).await.unwrap();

    rig.tune(3_550_000, "CW");
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(
        h.store.radio_state(&id).unwrap().frequency_hz,
        Some(3_550_000)
    );

    rig.tune(21_025_000, "CW");
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(
        h.store.radio_state(&id).unwrap().frequency_hz,
        Some(21_025_000)
    );

    h.manager.stop(&id).await;
}

#[tokio::test(start_paused = true)]
async fn overlapping_poll_is_skipped() {
    let h = Harness::new(SessionConfig::default());
    let id = h.add_radio("shack");
    h.factory.insert(
        &id,
        SimulatedRig::from_config(SimConfig {
            id: "shack".into(),
            latency_ms: 200,
            ..Default::default()
        }),
    );
    h.manager.start(&id).await.unwrap();

    let manager = h.manager.clone();
    let poll_id = id.clone();
    let first = tokio::spawn(async move { manager.poll(&poll_id).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.manager.poll(&id).await, PollOutcome::Skipped);
    assert!(matches!(first.await.unwrap(), PollOutcome::Updated { .. }));
}
