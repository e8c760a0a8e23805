//! Scripted gamepad backend for tests and demos.
//!
//! [`SimGamepad`] is a cloneable handle to shared state: keep one clone to
//! script connects, stick motion and button presses, hand another to a
//! [`GamepadPoller`][crate::poller::GamepadPoller].
//!
//! ```rust
//! use teleop_hal::{GamepadPoller, SimGamepad};
//! use teleop_types::{DeviceEvent, StickAxis};
//!
//! let sim = SimGamepad::new();
//! sim.connect(0, "sim");
//! let mut poller = GamepadPoller::new(sim.clone());
//! poller.poll_once().unwrap();
//!
//! sim.set_axis(0, StickAxis::LeftStickX, 0.5);
//! let events = poller.poll_once().unwrap();
//! assert!(events.contains(&DeviceEvent::GamepadAxis {
//!     id: 0,
//!     axis: StickAxis::LeftStickX,
//!     value: 0.5,
//! }));
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use teleop_types::{PadButton, StickAxis, TeleopError};

use crate::poller::{GamepadSource, PadReading};
use crate::registry::GamepadSnapshot;

#[derive(Debug, Clone, Default)]
pub struct SimGamepad {
    pads: Arc<Mutex<BTreeMap<usize, PadReading>>>,
}

impl SimGamepad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, id: usize, name: impl Into<String>) {
        let name = name.into();
        self.with_pads(|pads| {
            pads.entry(id).or_insert(PadReading {
                id,
                name,
                snapshot: GamepadSnapshot::default(),
            });
        });
    }

    pub fn disconnect(&self, id: usize) {
        self.with_pads(|pads| {
            pads.remove(&id);
        });
    }

    pub fn set_axis(&self, id: usize, axis: StickAxis, value: f64) {
        self.with_pads(|pads| {
            if let Some(pad) = pads.get_mut(&id) {
                pad.snapshot.axes.insert(axis, value);
            }
        });
    }

    pub fn press(&self, id: usize, button: PadButton) {
        self.with_pads(|pads| {
            if let Some(pad) = pads.get_mut(&id) {
                pad.snapshot.buttons.insert(button);
            }
        });
    }

    pub fn release(&self, id: usize, button: PadButton) {
        self.with_pads(|pads| {
            if let Some(pad) = pads.get_mut(&id) {
                pad.snapshot.buttons.remove(&button);
            }
        });
    }

    fn with_pads(&self, f: impl FnOnce(&mut BTreeMap<usize, PadReading>)) {
        // A poisoned lock only means a scripting thread panicked; keep going.
        let mut pads = match self.pads.lock() {
            Ok(pads) => pads,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut pads);
    }
}

impl GamepadSource for SimGamepad {
    fn poll(&mut self) -> Result<Vec<PadReading>, TeleopError> {
        let pads = self
            .pads
            .lock()
            .map_err(|_| TeleopError::DeviceUnavailable("simulated gamepad state poisoned".into()))?;
        Ok(pads.values().cloned().collect())
    }
}
