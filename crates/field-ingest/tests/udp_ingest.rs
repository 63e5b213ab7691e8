//! Ingestion against the in-memory store, and over a real UDP socket

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use field_ingest::{ContactIngestor, ForwardTarget, IngestConfig, IngestOutcome, UdpIngestServer, UNKNOWN_STATION};
use field_store::{topics, ContextLevel, MemoryStore, RecordingPublisher};
use tokio::net::UdpSocket;
use tokio::time::timeout;

const CONTACT: &str = "CALL=W1AW BAND=20 MODE=CW MYCALL=K1LI QSO_DATE=20250131 TIME_ON=123456";

fn sender() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 168, 1, 40))
}

fn harness() -> (
    Arc<MemoryStore>,
    Arc<RecordingPublisher>,
    ContactIngestor<MemoryStore, RecordingPublisher>,
) {
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let ingestor = ContactIngestor::new(store.clone(), publisher.clone());
    (store, publisher, ingestor)
}

#[tokio::test]
async fn contact_is_logged_with_side_records() {
    let (store, publisher, ingestor) = harness();

    let outcome = ingestor.ingest(CONTACT, sender()).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Created(_)));

    let entries = store.log_entries();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0].entry;
    assert_eq!(entry.callsign, "W1AW");
    assert_eq!(entry.qso_time, "12:34:56");
    assert_eq!(entry.source, "udp");
    assert_eq!(entry.dedupe_key, "none|none|K1LI|W1AW|20|CW|2025-01-31|12:34:56");
    assert_eq!(entry.raw_payload.as_deref(), Some(CONTACT));

    let station = store.station_by_callsign("K1LI").unwrap();
    assert_eq!(entry.station_id, station.id);
    assert_eq!(store.band_activities(station.id).len(), 1);
    let status = store.network_status(station.id).unwrap();
    assert!(status.connected);
    assert_eq!(status.ip.as_deref(), Some("192.168.1.40"));
    assert!(store
        .context_events()
        .iter()
        .any(|e| e.category == "UDP" && e.level == ContextLevel::Info));

    let created = publisher.events_named(topics::LOG_ENTRY_CREATED);
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].topic, topics::LOGS);
    assert_eq!(created[0].payload["callsign"], "W1AW");
}

#[tokio::test]
async fn identical_contacts_persist_once() {
    let (store, publisher, ingestor) = harness();

    ingestor.ingest(CONTACT, sender()).await.unwrap();
    let again = ingestor
        .ingest("<CALL:4>W1AW<BAND:2>20<MODE:2>CW<MYCALL:4>K1LI<QSO_DATE:8>20250131<TIME_ON:6>123456", sender())
        .await
        .unwrap();

    assert_eq!(again, IngestOutcome::Duplicate);
    assert_eq!(store.log_entries().len(), 1);
    assert_eq!(publisher.events_named(topics::LOG_ENTRY_CREATED).len(), 1);

    // Band activity is recorded either way
    let station = store.station_by_callsign("K1LI").unwrap();
    assert_eq!(store.band_activities(station.id).len(), 2);
}

#[tokio::test]
async fn scope_changes_the_dedupe_key() {
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let field_day = ContactIngestor::new(store.clone(), publisher.clone())
        .with_scope(Some("fd-2025".into()), Some("w1xyz".into()));
    let sprint = ContactIngestor::new(store.clone(), publisher.clone())
        .with_scope(Some("sprint".into()), Some("w1xyz".into()));

    field_day.ingest(CONTACT, sender()).await.unwrap();
    sprint.ingest(CONTACT, sender()).await.unwrap();

    let keys: Vec<String> = store
        .log_entries()
        .into_iter()
        .map(|e| e.entry.dedupe_key)
        .collect();
    assert_eq!(
        keys,
        vec![
            "fd-2025|w1xyz|K1LI|W1AW|20|CW|2025-01-31|12:34:56".to_string(),
            "sprint|w1xyz|K1LI|W1AW|20|CW|2025-01-31|12:34:56".to_string(),
        ]
    );
}

#[tokio::test]
async fn incomplete_contact_is_rejected() {
    let (store, publisher, ingestor) = harness();

    let outcome = ingestor
        .ingest("CALL=W1AW MODE=CW", sender())
        .await
        .unwrap();
    assert_eq!(outcome, IngestOutcome::Rejected);
    assert!(store.log_entries().is_empty());
    assert!(publisher.events().is_empty());

    let unknown = store.station_by_callsign(UNKNOWN_STATION).unwrap();
    let events = store.context_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].station_id, Some(unknown.id));
    assert_eq!(events[0].level, ContextLevel::Warn);
    assert_eq!(events[0].category, "UDP");
}

#[tokio::test]
async fn store_failure_is_returned() {
    let (store, _publisher, ingestor) = harness();
    store.set_unavailable(true);

    assert!(ingestor.ingest(CONTACT, sender()).await.is_err());
}

#[tokio::test]
async fn datagrams_are_logged_and_repeated() {
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let repeat_to = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let repeat_port = repeat_to.local_addr().unwrap().port();

    let config = IngestConfig {
        host: "127.0.0.1".into(),
        port: 0,
        targets: vec![ForwardTarget::new("127.0.0.1", repeat_port)],
        ..Default::default()
    };
    let server = UdpIngestServer::bind(&config, store.clone(), publisher.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(b"CALL=W1AW MODE=CW", addr).await.unwrap();
    client.send_to(CONTACT.as_bytes(), addr).await.unwrap();

    // Only the complete contact is repeated
    let mut buf = [0u8; 512];
    let (n, _) = timeout(Duration::from_secs(2), repeat_to.recv_from(&mut buf))
        .await
        .expect("no repeated datagram")
        .unwrap();
    assert_eq!(&buf[..n], CONTACT.as_bytes());

    assert_eq!(store.log_entries().len(), 1);
    assert_eq!(publisher.events_named(topics::LOG_ENTRY_CREATED).len(), 1);
}
