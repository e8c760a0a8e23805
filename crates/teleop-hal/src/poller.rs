//! [`GamepadPoller`] – fixed-period gamepad polling.
//!
//! Gamepad backends are poll-only: they expose the current state of every
//! connected pad and nothing else.  The poller turns consecutive readings
//! into discrete [`DeviceEvent`]s:
//!
//! - a new id → `GamepadConnected`, followed by its initial axis/button state
//! - a missing id → `GamepadDisconnected`
//! - changed axes and button edges → `GamepadAxis` / `GamepadButton`
//! - every connected pad on every poll → `GamepadHeartbeat`
//!
//! [`GamepadPoller::spawn`] runs this on a dedicated OS thread and forwards
//! the events into the control loop's device queue.  The backend is built
//! inside that thread, so it does not have to be `Send`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use teleop_types::{DeviceEvent, TeleopError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::registry::{GamepadRegistry, GamepadSnapshot};

/// Default time between two polls.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(10);

/// State of one connected pad as read from a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PadReading {
    pub id: usize,
    pub name: String,
    pub snapshot: GamepadSnapshot,
}

/// A gamepad backend.
pub trait GamepadSource {
    /// Read every currently connected pad.
    fn poll(&mut self) -> Result<Vec<PadReading>, TeleopError>;
}

pub struct GamepadPoller<S> {
    source: S,
    registry: GamepadRegistry,
}

impl<S: GamepadSource> GamepadPoller<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            registry: GamepadRegistry::new(),
        }
    }

    pub fn registry(&self) -> &GamepadRegistry {
        &self.registry
    }

    /// Poll the backend once and return the resulting events.
    pub fn poll_once(&mut self) -> Result<Vec<DeviceEvent>, TeleopError> {
        let readings = self.source.poll()?;
        let mut events = Vec::new();

        for id in self.registry.ids() {
            if readings.iter().any(|r| r.id == id) {
                continue;
            }
            if let Some(pad) = self.registry.disconnect(id) {
                let remaining = self.registry.len();
                info!(pad = id, name = %pad.name, remaining, "gamepad disconnected");
                events.push(DeviceEvent::GamepadDisconnected { id });
            }
        }

        for reading in readings {
            let PadReading { id, name, snapshot } = reading;
            if self.registry.connect(id, name.clone()) {
                info!(pad = id, name = %name, connected = self.registry.len(), "gamepad connected");
                events.push(DeviceEvent::GamepadConnected { id, name });
            }
            events.extend(self.registry.update(id, snapshot));
            events.push(DeviceEvent::GamepadHeartbeat { id });
        }

        Ok(events)
    }
}

impl<S: GamepadSource + 'static> GamepadPoller<S> {
    /// Start polling on a dedicated thread every `period`.
    ///
    /// `factory` builds the backend inside the thread.  If it fails the
    /// thread logs the error and exits; no events are ever produced and the
    /// other devices are unaffected.  The thread also exits when the
    /// receiving side of `tx` is dropped or the handle is stopped.
    ///
    /// # Errors
    ///
    /// [`TeleopError::DeviceUnavailable`] when the OS refuses to spawn the
    /// thread.
    pub fn spawn<F>(
        factory: F,
        period: Duration,
        tx: mpsc::Sender<DeviceEvent>,
    ) -> Result<PollerHandle, TeleopError>
    where
        F: FnOnce() -> Result<S, TeleopError> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let join = thread::Builder::new()
            .name("gamepad-poller".into())
            .spawn(move || {
                let source = match factory() {
                    Ok(source) => source,
                    Err(e) => {
                        warn!(error = %e, "gamepad backend unavailable");
                        return;
                    }
                };
                let mut poller = GamepadPoller::new(source);
                debug!(period_ms = period.as_millis() as u64, "gamepad polling started");

                while !stop_flag.load(Ordering::Relaxed) {
                    match poller.poll_once() {
                        Ok(events) => {
                            for event in events {
                                if tx.blocking_send(event).is_err() {
                                    debug!("device queue closed, gamepad polling stopped");
                                    return;
                                }
                            }
                        }
                        Err(e) => warn!(error = %e, "gamepad poll failed"),
                    }
                    thread::sleep(period);
                }
                debug!("gamepad polling stopped");
            })
            .map_err(|e| TeleopError::DeviceUnavailable(format!("gamepad poller thread: {e}")))?;

        Ok(PollerHandle {
            stop,
            join: Some(join),
        })
    }
}

/// Owns the polling thread; stops it when dropped.
pub struct PollerHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Signal the thread to stop and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("gamepad poller thread panicked");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
