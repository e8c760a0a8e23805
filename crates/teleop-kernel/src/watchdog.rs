//! [`DeviceWatchdog`] – heartbeat deadlines for polled input devices.
//!
//! A device is watched from the moment it connects.  Its poller calls
//! [`DeviceWatchdog::feed`] on every poll; once the last heartbeat is older
//! than the timeout [`DeviceWatchdog::health`] reports it as timed out and
//! the controller escalates to a stop.  Disconnected devices are forgotten.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use teleop_types::ControlMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceHealth {
    Healthy,
    TimedOut,
    /// The device is not connected, so nothing is expected from it.
    Unwatched,
}

pub struct DeviceWatchdog {
    timeout: Duration,
    last_heartbeat: HashMap<ControlMode, Instant>,
}

impl DeviceWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_heartbeat: HashMap::new(),
        }
    }

    /// Start watching `device`, with its deadline starting now.
    ///
    /// Watching an already watched device resets its deadline.
    pub fn watch(&mut self, device: ControlMode) {
        self.last_heartbeat.insert(device, Instant::now());
    }

    /// Record a heartbeat.  No-op for unwatched devices.
    pub fn feed(&mut self, device: ControlMode) {
        if let Some(last) = self.last_heartbeat.get_mut(&device) {
            *last = Instant::now();
        }
    }

    pub fn forget(&mut self, device: ControlMode) {
        self.last_heartbeat.remove(&device);
    }

    pub fn health(&self, device: ControlMode) -> DeviceHealth {
        match self.last_heartbeat.get(&device) {
            None => DeviceHealth::Unwatched,
            Some(last) if last.elapsed() <= self.timeout => DeviceHealth::Healthy,
            Some(_) => DeviceHealth::TimedOut,
        }
    }
}
