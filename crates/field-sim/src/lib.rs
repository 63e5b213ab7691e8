//! Radio Simulation Library
//!
//! This crate provides [`SimulatedRig`], an in-memory radio implementing the
//! [`Rig`](field_rigctl::Rig) trait. It lets the session manager and the
//! gateway run without any rigctld daemon or hardware.
//!
//! # Example
//!
//! ```rust
//! use field_rigctl::Rig;
//! use field_sim::SimulatedRig;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let rig = SimulatedRig::new("sim-1");
//! assert!(rig.connect().await);
//!
//! // Operator turns the dial
//! rig.tune(7_030_000, "CW");
//! assert_eq!(rig.frequency().await.unwrap(), 7_030_000);
//! # }
//! ```

pub mod rig;

pub use rig::{SimConfig, SimulatedRig};
