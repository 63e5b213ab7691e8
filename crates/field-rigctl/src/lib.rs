//! rigctld Radio Control
//!
//! This crate talks to Hamlib `rigctld` daemons over TCP and exposes the
//! common [`Rig`] trait used by the session manager.
//!
//! # Architecture
//!
//! - [`protocol`]: command strings, reply line parsing, power and mode helpers
//! - [`queue`]: the per-connection [`CommandQueue`] state machine
//! - [`client`]: [`RigctlClient`], which owns one link task per connection
//!
//! Commands are pipelined: callers may submit any number concurrently, but
//! only the head of the queue is on the wire and replies resolve in FIFO
//! order.
//!
//! # Example
//!
//! ```rust,no_run
//! use field_rigctl::{Rig, RigctlClient, RigctlConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), field_rigctl::RigError> {
//! let rig = RigctlClient::new(RigctlConfig::new("127.0.0.1", 4532));
//! if rig.connect().await {
//!     rig.set_frequency(14_074_000).await?;
//!     let mode = rig.mode().await?;
//!     println!("{} {} Hz", mode.mode, mode.passband_hz);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod rig;

pub use client::{RigctlClient, RigctlConfig};
pub use error::RigError;
pub use protocol::{normalize_mode, CapabilityKind, ReplyLine, RigCommand, DEFAULT_PORT};
pub use queue::{CommandQueue, Request};
pub use rig::{ModeSetting, Rig, RigCapabilities, RigSnapshot};
