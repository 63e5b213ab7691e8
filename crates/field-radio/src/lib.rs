//! Radio Sessions
//!
//! This crate keeps the store's view of every configured radio current. The
//! [`RadioSessionManager`] connects each enabled radio connection through a
//! [`RigFactory`], polls it on a timer, persists what it reads and announces
//! changes on the publish channel.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use field_radio::{DefaultRigFactory, RadioSessionManager, SessionConfig};
//! use field_store::{MemoryStore, RadioConnection, RadioId, RecordingPublisher};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemoryStore::new());
//! store.insert_radio_connection(RadioConnection::simulated("sim-1"));
//!
//! let manager = RadioSessionManager::new(
//!     store,
//!     Arc::new(RecordingPublisher::new()),
//!     DefaultRigFactory::default(),
//!     SessionConfig::default(),
//! );
//! assert!(manager.start(&RadioId::new("sim-1")).await.unwrap());
//! manager.stop_all().await;
//! # }
//! ```

pub mod anyrig;
pub mod band;
pub mod config;
pub mod error;
pub mod manager;

pub use anyrig::{AnyRig, DefaultRigFactory, RigFactory};
pub use band::{frequency_to_band, ModeCategory};
pub use config::SessionConfig;
pub use error::SessionError;
pub use manager::{PollOutcome, RadioSessionManager, FAILED_TO_CONNECT};
