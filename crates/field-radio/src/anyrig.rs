//! Rig Wrapper
//!
//! Sessions hold an [`AnyRig`] so one manager can drive rigctld daemons and
//! simulated radios side by side. The concrete rig is chosen per connection
//! by a [`RigFactory`].

use field_rigctl::{ModeSetting, Rig, RigCapabilities, RigError, RigSnapshot, RigctlClient, RigctlConfig};
use field_sim::SimulatedRig;
use field_store::{ConnectionKind, RadioConnection};

/// A rig of any supported kind
pub enum AnyRig {
    /// A rigctld daemon over TCP
    Rigctl(RigctlClient),
    /// The in-memory simulator
    Simulated(SimulatedRig),
}

macro_rules! dispatch {
    ($self:ident, $rig:ident => $call:expr) => {
        match $self {
            AnyRig::Rigctl($rig) => $call,
            AnyRig::Simulated($rig) => $call,
        }
    };
}

impl Rig for AnyRig {
    async fn connect(&self) -> bool {
        dispatch!(self, rig => rig.connect().await)
    }

    async fn disconnect(&self) {
        dispatch!(self, rig => rig.disconnect().await)
    }

    fn is_connected(&self) -> bool {
        dispatch!(self, rig => rig.is_connected())
    }

    async fn frequency(&self) -> Result<u64, RigError> {
        dispatch!(self, rig => rig.frequency().await)
    }

    async fn set_frequency(&self, hz: u64) -> Result<(), RigError> {
        dispatch!(self, rig => rig.set_frequency(hz).await)
    }

    async fn mode(&self) -> Result<ModeSetting, RigError> {
        dispatch!(self, rig => rig.mode().await)
    }

    async fn set_mode(&self, mode: &str, passband_hz: u32) -> Result<(), RigError> {
        dispatch!(self, rig => rig.set_mode(mode, passband_hz).await)
    }

    async fn power(&self) -> Result<u8, RigError> {
        dispatch!(self, rig => rig.power().await)
    }

    async fn set_power(&self, percent: f64) -> Result<(), RigError> {
        dispatch!(self, rig => rig.set_power(percent).await)
    }

    async fn ptt(&self) -> Result<bool, RigError> {
        dispatch!(self, rig => rig.ptt().await)
    }

    async fn set_ptt(&self, on: bool) -> Result<(), RigError> {
        dispatch!(self, rig => rig.set_ptt(on).await)
    }

    async fn vfo(&self) -> Result<String, RigError> {
        dispatch!(self, rig => rig.vfo().await)
    }

    async fn set_vfo(&self, vfo: &str) -> Result<(), RigError> {
        dispatch!(self, rig => rig.set_vfo(vfo).await)
    }

    async fn info(&self) -> Result<String, RigError> {
        dispatch!(self, rig => rig.info().await)
    }

    async fn capabilities(&self) -> Result<RigCapabilities, RigError> {
        dispatch!(self, rig => rig.capabilities().await)
    }

    async fn raw(
        &self,
        command: &str,
        expected_lines: usize,
        silent_ok: bool,
    ) -> Result<Vec<String>, RigError> {
        dispatch!(self, rig => rig.raw(command, expected_lines, silent_ok).await)
    }

    async fn snapshot(&self) -> RigSnapshot {
        dispatch!(self, rig => rig.snapshot().await)
    }
}

/// Creates the rig for a radio connection record
pub trait RigFactory: Send + Sync + 'static {
    fn create(&self, connection: &RadioConnection) -> AnyRig;
}

/// Factory used in production
///
/// rigctld connections share the timeouts of `template`; simulated
/// connections get a fresh simulator.
#[derive(Debug, Clone, Default)]
pub struct DefaultRigFactory {
    template: RigctlConfig,
}

impl DefaultRigFactory {
    pub fn new(template: RigctlConfig) -> Self {
        Self { template }
    }
}

impl RigFactory for DefaultRigFactory {
    fn create(&self, connection: &RadioConnection) -> AnyRig {
        match connection.kind {
            ConnectionKind::Rigctld => AnyRig::Rigctl(RigctlClient::new(RigctlConfig {
                host: connection.host.clone(),
                port: connection.port,
                ..self.template.clone()
            })),
            ConnectionKind::Simulated => {
                AnyRig::Simulated(SimulatedRig::new(connection.id.as_str()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_picks_rig_by_kind() {
        let factory = DefaultRigFactory::new(RigctlConfig {
            command_timeout_ms: 750,
            ..Default::default()
        });

        match factory.create(&RadioConnection::rigctld("a", "10.0.0.9", 4533)) {
            AnyRig::Rigctl(client) => {
                assert_eq!(client.config().address(), "10.0.0.9:4533");
                assert_eq!(client.config().command_timeout_ms, 750);
            }
            AnyRig::Simulated(_) => panic!("expected rigctl client"),
        }

        assert!(matches!(
            factory.create(&RadioConnection::simulated("b")),
            AnyRig::Simulated(_)
        ));
    }

    #[tokio::test]
    async fn simulated_rig_through_wrapper() {
        let sim = SimulatedRig::new("sim");
        let rig = AnyRig::Simulated(sim.clone());
        assert!(rig.connect().await);
        sim.tune(7_010_000, "CW");

        let snapshot = rig.snapshot().await;
        assert_eq!(snapshot.frequency_hz, Some(7_010_000));
    }
}
