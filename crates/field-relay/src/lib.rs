//! N3FJP Relay
//!
//! A TCP relay speaking the N3FJP network logging protocol. Every logging
//! client connects here; frames from one client are relayed verbatim to the
//! others while the relay tracks which station each client is, which band and
//! mode it announced, and which operator messages pass through.
//!
//! - [`codec`]: frame splitting and UTF-16LE body decoding
//! - [`message`]: tag-based message classification
//! - [`hub`]: the actor owning all peer sessions
//! - [`server`]: the TCP listener and per-peer socket tasks
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use field_relay::{RelayConfig, RelayServer};
//! use field_store::{MemoryStore, TracingPublisher};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), field_relay::RelayError> {
//! let server = RelayServer::bind(
//!     &RelayConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(TracingPublisher),
//! )
//! .await?;
//! server.run().await
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod hub;
pub mod message;
pub mod server;

pub use codec::{decode_body, encode_frame, RelayFrameCodec};
pub use error::RelayError;
pub use hub::{run_hub, HubCommand, PeerId, RelayHub};
pub use message::{announcement, RelayMessage};
pub use server::{RelayConfig, RelayServer};
