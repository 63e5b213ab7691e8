//! Field Store
//!
//! The gateway's services never own persistent data. Everything they learn
//! (radio state, band activity, network status, operator messages, log
//! entries) is handed to an external store, and every state change is
//! announced on a publish channel. This crate defines those two collaborators
//! as traits together with the records that cross them:
//!
//! - [`Store`]: create/read/update operations used by the radio sessions, the
//!   relay and the UDP ingestor
//! - [`Publisher`]: fire-and-forget `publish(topic, event, payload)`
//! - [`MemoryStore`]: an in-memory [`Store`] with the same uniqueness rules as
//!   the real persistence layer, used by tests and the standalone gateway
//!
//! # Example
//!
//! ```rust
//! use field_store::{MemoryStore, Store};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = MemoryStore::new();
//! let a = store.find_or_create_station("K1LI").await.unwrap();
//! let b = store.find_or_create_station("K1LI").await.unwrap();
//! assert_eq!(a.id, b.id);
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod model;
pub mod publish;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use model::{
    BandActivity, BandActivityUpdate, ConnectionKind, ContextEvent, ContextLevel, CreateOutcome,
    LogEntry, LogEntryId, NetworkStatus, NewLogEntry, OperatorMessage, RadioConnection, RadioId,
    RadioState, Station, StationId,
};
pub use publish::{topics, PublishedEvent, Publisher, RecordingPublisher, TracingPublisher};
pub use store::Store;
