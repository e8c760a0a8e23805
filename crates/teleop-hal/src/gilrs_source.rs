//! Native gamepad backend on top of `gilrs`.
//!
//! `gilrs` reports stick Y with up positive; snapshots use the browser
//! convention (down positive), so both Y axes are negated here.

use gilrs::{Axis, Button, Gamepad, Gilrs};
use teleop_types::{PadButton, StickAxis, TeleopError};

use crate::poller::{GamepadSource, PadReading};
use crate::registry::GamepadSnapshot;

const AXIS_MAP: [(Axis, StickAxis, f64); 4] = [
    (Axis::LeftStickX, StickAxis::LeftStickX, 1.0),
    (Axis::LeftStickY, StickAxis::LeftStickY, -1.0),
    (Axis::RightStickX, StickAxis::RightStickX, 1.0),
    (Axis::RightStickY, StickAxis::RightStickY, -1.0),
];

const BUTTON_MAP: [(Button, PadButton); 8] = [
    (Button::South, PadButton::South),
    (Button::East, PadButton::East),
    (Button::North, PadButton::North),
    (Button::West, PadButton::West),
    (Button::LeftTrigger2, PadButton::LeftTrigger),
    (Button::RightTrigger2, PadButton::RightTrigger),
    (Button::Start, PadButton::Start),
    (Button::Select, PadButton::Select),
];

pub struct GilrsSource {
    gilrs: Gilrs,
}

impl GilrsSource {
    /// # Errors
    ///
    /// [`TeleopError::DeviceUnavailable`] when the platform gamepad API cannot
    /// be initialised.
    pub fn new() -> Result<Self, TeleopError> {
        let gilrs = Gilrs::new()
            .map_err(|e| TeleopError::DeviceUnavailable(format!("gilrs init failed: {e}")))?;
        Ok(Self { gilrs })
    }
}

fn snapshot(pad: &Gamepad<'_>) -> GamepadSnapshot {
    let mut snapshot = GamepadSnapshot::default();
    for (axis, stick, sign) in AXIS_MAP {
        snapshot.axes.insert(stick, f64::from(pad.value(axis)) * sign);
    }
    for (button, pad_button) in BUTTON_MAP {
        if pad.is_pressed(button) {
            snapshot.buttons.insert(pad_button);
        }
    }
    snapshot
}

impl GamepadSource for GilrsSource {
    fn poll(&mut self) -> Result<Vec<PadReading>, TeleopError> {
        // Drain the event queue so gilrs refreshes its cached pad state.
        while self.gilrs.next_event().is_some() {}

        Ok(self
            .gilrs
            .gamepads()
            .filter(|(_, pad)| pad.is_connected())
            .map(|(id, pad)| PadReading {
                id: usize::from(id),
                name: pad.name().to_string(),
                snapshot: snapshot(&pad),
            })
            .collect())
    }
}
