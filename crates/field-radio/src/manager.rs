//! Radio Session Manager
//!
//! The manager owns one session per active radio connection. A session holds
//! the rig, a reconnect counter, the last persisted [`RadioState`] and the
//! handle of its poll task.
//!
//! # Polling
//!
//! Each session's poller ticks at the connection's interval with missed ticks
//! skipped. A poll:
//!
//! 1. is skipped if the previous poll of the same radio is still running
//! 2. reconnects the rig if it reports the link down, stopping the session
//!    once [`SessionConfig::max_reconnect_attempts`] consecutive attempts fail
//! 3. reads frequency, mode and power, persists them and publishes
//!    `radio:state`
//! 4. replaces the band activity of every assigned station when the band or
//!    mode category changed, publishing `band:change`
//!
//! Sessions are tagged with an epoch so a poller left over from a stopped
//! session never touches a newer session of the same radio.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use field_rigctl::Rig;
use field_store::{topics, BandActivityUpdate, Publisher, RadioId, RadioState, Store};
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::anyrig::{AnyRig, DefaultRigFactory, RigFactory};
use crate::band::{frequency_to_band, ModeCategory};
use crate::config::SessionConfig;
use crate::error::SessionError;

/// `last_error` recorded when the initial connect fails
pub const FAILED_TO_CONNECT: &str = "Failed to connect";

/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// State was read and persisted
    Updated { band_changed: bool },
    /// A poll of the same radio was still running
    Skipped,
    /// No active session for the radio
    Inactive,
    /// The link was down and this reconnect attempt failed
    Reconnecting { attempt: u32 },
    /// Every state read failed
    Failed,
    /// Reconnect attempts ran out and the session was stopped
    Exhausted,
}

struct Poller {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct Session {
    epoch: u64,
    rig: Arc<AnyRig>,
    poll_in_progress: Arc<AtomicBool>,
    reconnect_attempts: u32,
    last_band: Option<(&'static str, ModeCategory)>,
    state: RadioState,
    poller: Option<Poller>,
}

/// Clears a poll-in-progress flag when dropped
struct PollGuard(Arc<AtomicBool>);

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Shared<S, P, F> {
    store: Arc<S>,
    publisher: Arc<P>,
    factory: F,
    config: SessionConfig,
    next_epoch: AtomicU64,
    sessions: Mutex<HashMap<RadioId, Session>>,
}

/// Manages the lifecycle and polling of radio connections
pub struct RadioSessionManager<S, P, F = DefaultRigFactory> {
    shared: Arc<Shared<S, P, F>>,
}

impl<S, P, F> Clone for RadioSessionManager<S, P, F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Store, P: Publisher, F: RigFactory> RadioSessionManager<S, P, F> {
    pub fn new(store: Arc<S>, publisher: Arc<P>, factory: F, config: SessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                publisher,
                factory,
                config,
                next_epoch: AtomicU64::new(1),
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Connect a radio and start polling it
    ///
    /// Returns `Ok(true)` when the session is active (including when it
    /// already was) and `Ok(false)` when the rig could not be reached.
    pub async fn start(&self, id: &RadioId) -> Result<bool, SessionError> {
        let shared = &self.shared;
        let connection = shared
            .store
            .radio_connection(id)
            .await?
            .ok_or_else(|| SessionError::UnknownRadio(id.clone()))?;
        if !connection.enabled {
            return Err(SessionError::Disabled(id.clone()));
        }

        let epoch = shared.next_epoch.fetch_add(1, Ordering::Relaxed);
        let rig = Arc::new(shared.factory.create(&connection));
        {
            let mut sessions = shared.sessions();
            if sessions.contains_key(id) {
                debug!("Radio {} is already active", id);
                return Ok(true);
            }
            sessions.insert(
                id.clone(),
                Session {
                    epoch,
                    rig: Arc::clone(&rig),
                    poll_in_progress: Arc::new(AtomicBool::new(false)),
                    reconnect_attempts: 0,
                    last_band: None,
                    state: connection.state.clone(),
                    poller: None,
                },
            );
        }

        info!(
            "Connecting radio {} ({}) at {}",
            id,
            connection.name,
            connection.address()
        );
        if !rig.connect().await {
            warn!("Radio {} failed to connect", id);
            let mut state = shared
                .remove_if_current(id, epoch)
                .map(|session| session.state)
                .unwrap_or(connection.state);
            state.connected = false;
            state.last_error = Some(FAILED_TO_CONNECT.to_string());
            shared.persist(id, state).await;
            return Ok(false);
        }

        let connected = shared.update_state(id, epoch, |state| {
            state.connected = true;
            state.last_error = None;
            state.last_seen = Some(Utc::now());
        });
        let Some(state) = connected else {
            debug!("Radio {} was stopped while connecting", id);
            rig.disconnect().await;
            return Ok(false);
        };
        shared.persist(id, state).await;

        let period = Duration::from_millis(
            connection
                .poll_interval_ms
                .max(shared.config.min_poll_interval_ms),
        );
        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_poller(
            Arc::downgrade(shared),
            id.clone(),
            epoch,
            period,
            stop_rx,
        ));
        // A session stopped meanwhile drops the poller, which then exits
        shared.with_session(id, epoch, |session| {
            session.poller = Some(Poller { stop, task });
        });
        info!("Radio {} connected, polling every {:?}", id, period);
        Ok(true)
    }

    /// Stop polling, disconnect and mark the radio disconnected
    ///
    /// Returns `false` if the radio had no active session.
    pub async fn stop(&self, id: &RadioId) -> bool {
        let Some(mut session) = self.shared.sessions().remove(id) else {
            debug!("Radio {} is not active", id);
            return false;
        };

        info!("Stopping radio {}", id);
        session.rig.disconnect().await;
        if let Some(Poller { stop, task }) = session.poller.take() {
            drop(stop);
            // Waits out an in-flight poll so it cannot overwrite the final state
            let _ = task.await;
        }

        session.state.connected = false;
        self.shared.persist(id, session.state).await;
        self.shared.publisher.publish(
            topics::RADIOS,
            topics::RADIO_STOPPED,
            json!({ "radioId": id.as_str(), "reason": "stopped" }),
        );
        true
    }

    /// Stop and start again with a fresh reconnect budget
    pub async fn restart(&self, id: &RadioId) -> Result<bool, SessionError> {
        self.stop(id).await;
        self.start(id).await
    }

    /// Start every enabled radio connection; returns how many are active
    pub async fn start_all(&self) -> Result<usize, SessionError> {
        let connections = self.shared.store.enabled_radio_connections().await?;
        let mut active = 0;
        for connection in connections {
            match self.start(&connection.id).await {
                Ok(true) => active += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to start radio {}: {}", connection.id, e),
            }
        }
        info!("Started {} radio session(s)", active);
        Ok(active)
    }

    /// Stop every active session
    pub async fn stop_all(&self) {
        for id in self.active_radios() {
            self.stop(&id).await;
        }
    }

    /// Poll a radio once, outside its timer
    pub async fn poll(&self, id: &RadioId) -> PollOutcome {
        self.shared.poll(id, None).await
    }

    pub fn is_active(&self, id: &RadioId) -> bool {
        self.shared.sessions().contains_key(id)
    }

    /// Ids of all active sessions
    pub fn active_radios(&self) -> Vec<RadioId> {
        let mut ids: Vec<RadioId> = self.shared.sessions().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Consecutive failed reconnects of an active session
    pub fn reconnect_attempts(&self, id: &RadioId) -> Option<u32> {
        self.shared
            .sessions()
            .get(id)
            .map(|session| session.reconnect_attempts)
    }

    /// Last state persisted for an active session
    pub fn state(&self, id: &RadioId) -> Option<RadioState> {
        self.shared
            .sessions()
            .get(id)
            .map(|session| session.state.clone())
    }
}

impl<S: Store, P: Publisher, F: RigFactory> Shared<S, P, F> {
    fn sessions(&self) -> MutexGuard<'_, HashMap<RadioId, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_session<T>(
        &self,
        id: &RadioId,
        epoch: u64,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Option<T> {
        self.sessions()
            .get_mut(id)
            .filter(|session| session.epoch == epoch)
            .map(f)
    }

    fn update_state(
        &self,
        id: &RadioId,
        epoch: u64,
        f: impl FnOnce(&mut RadioState),
    ) -> Option<RadioState> {
        self.with_session(id, epoch, |session| {
            f(&mut session.state);
            session.state.clone()
        })
    }

    fn remove_if_current(&self, id: &RadioId, epoch: u64) -> Option<Session> {
        let mut sessions = self.sessions();
        if sessions.get(id).is_some_and(|session| session.epoch == epoch) {
            sessions.remove(id)
        } else {
            None
        }
    }

    async fn persist(&self, id: &RadioId, state: RadioState) {
        if let Err(e) = self.store.upsert_radio_state(id, state.clone()).await {
            warn!("Failed to persist state of radio {}: {}", id, e);
        }
        self.publisher.publish(
            topics::RADIOS,
            topics::RADIO_STATE,
            json!({ "radioId": id.as_str(), "state": state }),
        );
    }

    async fn poll(&self, id: &RadioId, expected_epoch: Option<u64>) -> PollOutcome {
        let (epoch, rig, in_progress) = {
            let sessions = self.sessions();
            match sessions.get(id) {
                Some(s) if expected_epoch.map_or(true, |e| e == s.epoch) => {
                    (s.epoch, Arc::clone(&s.rig), Arc::clone(&s.poll_in_progress))
                }
                _ => return PollOutcome::Inactive,
            }
        };

        if in_progress.swap(true, Ordering::AcqRel) {
            debug!("Previous poll of radio {} still running, skipping", id);
            return PollOutcome::Skipped;
        }
        let _guard = PollGuard(in_progress);

        if !rig.is_connected() {
            if let Err(outcome) = self.reconnect(id, epoch, &rig).await {
                return outcome;
            }
        }

        let snapshot = rig.snapshot().await;
        if snapshot.is_empty() {
            let error = snapshot
                .error
                .unwrap_or_else(|| "No response from radio".to_string());
            warn!("Poll of radio {} failed: {}", id, error);
            let connected = rig.is_connected();
            let Some(state) = self.update_state(id, epoch, |state| {
                state.connected = connected;
                state.last_error = Some(error);
            }) else {
                return PollOutcome::Inactive;
            };
            self.persist(id, state).await;
            return PollOutcome::Failed;
        }

        let updated = self.update_state(id, epoch, |state| {
            if let Some(hz) = snapshot.frequency_hz {
                state.frequency_hz = Some(hz);
            }
            if let Some(mode) = &snapshot.mode {
                state.mode = Some(mode.mode.clone());
                state.passband_hz = Some(mode.passband_hz);
            }
            if let Some(pct) = snapshot.power_pct {
                state.power_pct = Some(pct);
            }
            state.connected = true;
            state.last_error = None;
            state.last_seen = Some(Utc::now());
        });
        let Some(state) = updated else {
            return PollOutcome::Inactive;
        };
        self.persist(id, state.clone()).await;

        let band_changed = self.reconcile_band(id, epoch, &state).await;
        PollOutcome::Updated { band_changed }
    }

    /// Bring a dropped link back; `Err` ends the poll with that outcome
    async fn reconnect(&self, id: &RadioId, epoch: u64, rig: &AnyRig) -> Result<(), PollOutcome> {
        let max = self.config.max_reconnect_attempts;
        let attempt = self
            .with_session(id, epoch, |session| {
                session.reconnect_attempts += 1;
                session.reconnect_attempts
            })
            .ok_or(PollOutcome::Inactive)?;

        if attempt > max {
            warn!(
                "Radio {} unreachable after {} reconnect attempts, stopping",
                id, max
            );
            let session = self
                .remove_if_current(id, epoch)
                .ok_or(PollOutcome::Inactive)?;
            rig.disconnect().await;

            let mut state = session.state;
            state.connected = false;
            state.last_error = Some(format!("Reconnect failed after {} attempts", max));
            self.persist(id, state).await;
            self.publisher.publish(
                topics::RADIOS,
                topics::RADIO_STOPPED,
                json!({ "radioId": id.as_str(), "reason": "reconnect attempts exhausted" }),
            );
            return Err(PollOutcome::Exhausted);
        }

        info!(
            "Radio {} disconnected, reconnect attempt {}/{}",
            id, attempt, max
        );
        rig.disconnect().await;
        if rig.connect().await {
            info!("Radio {} reconnected", id);
            self.with_session(id, epoch, |session| session.reconnect_attempts = 0);
            return Ok(());
        }

        let state = self
            .update_state(id, epoch, |state| {
                state.connected = false;
                state.last_error = Some(format!("Reconnect attempt {}/{} failed", attempt, max));
            })
            .ok_or(PollOutcome::Inactive)?;
        self.persist(id, state).await;
        Err(PollOutcome::Reconnecting { attempt })
    }

    /// Record a band or mode category change for the radio's stations
    async fn reconcile_band(&self, id: &RadioId, epoch: u64, state: &RadioState) -> bool {
        let (Some(hz), Some(mode)) = (state.frequency_hz, state.mode.as_deref()) else {
            return false;
        };
        let Some(band) = frequency_to_band(hz) else {
            return false;
        };
        let category = ModeCategory::from_mode(mode);

        let changed = self
            .with_session(id, epoch, |session| {
                let changed = session.last_band != Some((band, category));
                session.last_band = Some((band, category));
                changed
            })
            .unwrap_or(false);
        if !changed {
            return false;
        }

        let stations = match self.store.stations_for_radio(id).await {
            Ok(stations) => stations,
            Err(e) => {
                warn!("Failed to load stations of radio {}: {}", id, e);
                // Retry on the next poll
                self.with_session(id, epoch, |session| session.last_band = None);
                return false;
            }
        };

        info!("Radio {} now on {}m {}", id, band, category);
        for station in stations {
            let update = BandActivityUpdate {
                band: band.to_string(),
                mode: category.as_str().to_string(),
                frequency_hz: Some(hz),
                power_pct: state.power_pct,
            };
            if let Err(e) = self.store.replace_band_activity(station, update).await {
                warn!(
                    "Failed to record band activity of station {}: {}",
                    station, e
                );
                continue;
            }
            self.publisher.publish(
                topics::STATIONS,
                topics::BAND_CHANGE,
                json!({
                    "stationId": station.as_u64(),
                    "radioId": id.as_str(),
                    "band": band,
                    "mode": category.as_str(),
                    "frequencyHz": hz,
                }),
            );
        }
        true
    }
}

async fn run_poller<S: Store, P: Publisher, F: RigFactory>(
    shared: Weak<Shared<S, P, F>>,
    id: RadioId,
    epoch: u64,
    period: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {}
        }

        let Some(shared) = shared.upgrade() else {
            break;
        };
        match shared.poll(&id, Some(epoch)).await {
            PollOutcome::Inactive | PollOutcome::Exhausted => break,
            outcome => debug!("Poll of radio {}: {:?}", id, outcome),
        }
    }
    debug!("Poller for radio {} stopped", id);
}
