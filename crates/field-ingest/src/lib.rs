//! UDP Contact Ingestion
//!
//! Logging programs broadcast each contact as a UDP datagram. This crate
//! detects the payload encoding, maps the many field name variants onto one
//! contact record, persists it under a dedupe key and optionally repeats the
//! datagram to other listeners.
//!
//! # Example
//!
//! ```rust
//! use std::net::{IpAddr, Ipv4Addr};
//! use std::sync::Arc;
//!
//! use field_ingest::{ContactIngestor, IngestOutcome};
//! use field_store::{MemoryStore, RecordingPublisher};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemoryStore::new());
//! let ingestor = ContactIngestor::new(store.clone(), Arc::new(RecordingPublisher::new()));
//! let sender = IpAddr::V4(Ipv4Addr::LOCALHOST);
//!
//! let outcome = ingestor
//!     .ingest("CALL=W1AW BAND=20 MODE=CW MYCALL=K1LI", sender)
//!     .await
//!     .unwrap();
//! assert!(matches!(outcome, IngestOutcome::Created(_)));
//! assert_eq!(store.log_entries().len(), 1);
//! # }
//! ```

pub mod contact;
pub mod error;
pub mod listener;
pub mod parser;
pub mod targets;

pub use contact::{NormalizedContact, UNKNOWN_STATION};
pub use error::IngestError;
pub use listener::{ContactIngestor, IngestConfig, IngestOutcome, UdpIngestServer};
pub use parser::{detect_format, parse_payload, FieldMap, PayloadFormat};
pub use targets::{parse_targets, ForwardTarget};
