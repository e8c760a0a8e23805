//! [`GamepadRegistry`] – connected pads and their last known state.
//!
//! The registry is an ordinary owned value: the poller that feeds it holds
//! it, and tests construct their own.  Updating a pad with a fresh
//! [`GamepadSnapshot`] returns the [`DeviceEvent`]s describing what changed,
//! in a fixed axis-then-button order.

use std::collections::{BTreeMap, HashMap, HashSet};

use teleop_types::{DeviceEvent, PadButton, StickAxis};

/// Axes reported by every backend, in diff order.
pub const STICK_AXES: [StickAxis; 4] = [
    StickAxis::LeftStickX,
    StickAxis::LeftStickY,
    StickAxis::RightStickX,
    StickAxis::RightStickY,
];

/// Buttons reported by every backend, in diff order.
pub const PAD_BUTTONS: [PadButton; 8] = [
    PadButton::South,
    PadButton::East,
    PadButton::North,
    PadButton::West,
    PadButton::LeftTrigger,
    PadButton::RightTrigger,
    PadButton::Start,
    PadButton::Select,
];

/// Raw state of one pad at one poll.
///
/// Axis values are in `[-1, 1]` with `+y` pointing down, matching the
/// browser gamepad convention.  Missing axes read as `0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamepadSnapshot {
    pub axes: HashMap<StickAxis, f64>,
    pub buttons: HashSet<PadButton>,
}

impl GamepadSnapshot {
    pub fn axis(&self, axis: StickAxis) -> f64 {
        self.axes.get(&axis).copied().unwrap_or(0.0)
    }

    pub fn is_pressed(&self, button: PadButton) -> bool {
        self.buttons.contains(&button)
    }

    pub fn with_axis(mut self, axis: StickAxis, value: f64) -> Self {
        self.axes.insert(axis, value);
        self
    }

    pub fn with_button(mut self, button: PadButton) -> Self {
        self.buttons.insert(button);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedPad {
    pub name: String,
    pub snapshot: GamepadSnapshot,
}

#[derive(Debug, Default)]
pub struct GamepadRegistry {
    pads: BTreeMap<usize, ConnectedPad>,
}

impl GamepadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pad with a neutral snapshot.  Returns `false` when `id`
    /// was already connected, in which case nothing changes.
    pub fn connect(&mut self, id: usize, name: impl Into<String>) -> bool {
        if self.pads.contains_key(&id) {
            return false;
        }
        self.pads.insert(
            id,
            ConnectedPad {
                name: name.into(),
                snapshot: GamepadSnapshot::default(),
            },
        );
        true
    }

    pub fn disconnect(&mut self, id: usize) -> Option<ConnectedPad> {
        self.pads.remove(&id)
    }

    pub fn is_connected(&self, id: usize) -> bool {
        self.pads.contains_key(&id)
    }

    /// Connected pad ids in ascending order.
    pub fn ids(&self) -> Vec<usize> {
        self.pads.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pads.is_empty()
    }

    /// Store `snapshot` for `id` and return the axis and button changes
    /// relative to the previous one.  Unknown ids yield no events.
    pub fn update(&mut self, id: usize, snapshot: GamepadSnapshot) -> Vec<DeviceEvent> {
        let Some(pad) = self.pads.get_mut(&id) else {
            return Vec::new();
        };
        let previous = &pad.snapshot;
        let mut events = Vec::new();

        for axis in STICK_AXES {
            let value = snapshot.axis(axis);
            if value != previous.axis(axis) {
                events.push(DeviceEvent::GamepadAxis { id, axis, value });
            }
        }
        for button in PAD_BUTTONS {
            let pressed = snapshot.is_pressed(button);
            if pressed != previous.is_pressed(button) {
                events.push(DeviceEvent::GamepadButton { id, button, pressed });
            }
        }

        pad.snapshot = snapshot;
        events
    }
}
