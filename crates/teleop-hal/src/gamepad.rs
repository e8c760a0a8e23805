//! Gamepad adapter.
//!
//! The left stick drives: X → steering, Y → velocity.  Readings inside the
//! dead zone become `0` before anything else happens; readings outside it
//! are sign-inverted (per axis, on by default) and proposed as absolute
//! values.
//!
//! Buttons act on the press edge:
//!
//! | button          | intent                |
//! |-----------------|-----------------------|
//! | East            | request OFF           |
//! | South           | request REMOTE        |
//! | North           | request AUTO          |
//! | RightTrigger    | neutral               |
//!
//! Only one pad drives at a time, the first one connected.  When it
//! disconnects the adapter asks for a stop and hands control to the
//! lowest-numbered pad still connected, which drives once a mode is
//! requested again.

use std::collections::BTreeSet;

use teleop_types::{
    AxisProposal, ControlMode, DeviceEvent, Intent, Mode, PadButton, StickAxis, StopReason,
};
use tracing::{debug, info};

use crate::adapter::InputAdapter;

/// Zero `value` when its magnitude is below `dead_zone`.  NaN reads as `0`.
pub fn apply_dead_zone(value: f64, dead_zone: f64) -> f64 {
    if value.is_nan() || value.abs() < dead_zone {
        0.0
    } else {
        value
    }
}

#[derive(Debug)]
pub struct GamepadAdapter {
    dead_zone: f64,
    invert_velocity: bool,
    invert_steering: bool,
    active_pad: Option<usize>,
    connected: BTreeSet<usize>,
}

impl GamepadAdapter {
    pub fn new(dead_zone: f64) -> Self {
        let mut adapter = Self {
            dead_zone: 0.0,
            invert_velocity: true,
            invert_steering: true,
            active_pad: None,
            connected: BTreeSet::new(),
        };
        adapter.set_dead_zone(dead_zone);
        adapter
    }

    /// Override the default inversion of both axes.
    pub fn with_inversion(mut self, velocity: bool, steering: bool) -> Self {
        self.invert_velocity = velocity;
        self.invert_steering = steering;
        self
    }

    /// Update the dead zone, clamped into `[0, 1]`.
    pub fn set_dead_zone(&mut self, dead_zone: f64) {
        self.dead_zone = if dead_zone.is_nan() {
            0.0
        } else {
            dead_zone.clamp(0.0, 1.0)
        };
    }

    pub fn dead_zone(&self) -> f64 {
        self.dead_zone
    }

    pub fn active_pad(&self) -> Option<usize> {
        self.active_pad
    }

    fn stick(&self, axis: StickAxis, value: f64) -> Option<AxisProposal> {
        let filtered = apply_dead_zone(value, self.dead_zone);
        let invert = |flag: bool| if flag && filtered != 0.0 { -filtered } else { filtered };
        match axis {
            StickAxis::LeftStickX => Some(AxisProposal::steering(invert(self.invert_steering))),
            StickAxis::LeftStickY => Some(AxisProposal::velocity(invert(self.invert_velocity))),
            StickAxis::RightStickX | StickAxis::RightStickY => None,
        }
    }
}

impl Default for GamepadAdapter {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl InputAdapter for GamepadAdapter {
    fn control_mode(&self) -> ControlMode {
        ControlMode::Gamepad
    }

    fn handle(&mut self, event: &DeviceEvent) -> Vec<Intent> {
        match event {
            DeviceEvent::GamepadConnected { id, name } => {
                self.connected.insert(*id);
                if self.active_pad.is_none() {
                    info!(pad = id, name = %name, "gamepad selected as input");
                    self.active_pad = Some(*id);
                }
                Vec::new()
            }
            DeviceEvent::GamepadDisconnected { id } => {
                self.connected.remove(id);
                if self.active_pad != Some(*id) {
                    return Vec::new();
                }
                self.active_pad = self.connected.first().copied();
                if let Some(next) = self.active_pad {
                    info!(pad = next, "gamepad selected as input");
                }
                vec![Intent::Stop(StopReason::DeviceDisconnected(ControlMode::Gamepad))]
            }
            DeviceEvent::GamepadAxis { id, axis, value } if self.active_pad == Some(*id) => self
                .stick(*axis, *value)
                .map(Intent::Propose)
                .into_iter()
                .collect(),
            DeviceEvent::GamepadButton {
                id,
                button,
                pressed: true,
            } if self.active_pad == Some(*id) => match button {
                PadButton::East => vec![Intent::RequestMode(Mode::Off)],
                PadButton::South => vec![Intent::RequestMode(Mode::Remote)],
                PadButton::North => vec![Intent::RequestMode(Mode::Auto)],
                PadButton::RightTrigger => vec![Intent::Neutral],
                other => {
                    debug!(button = ?other, "unmapped gamepad button");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        }
    }

    fn reset(&mut self) {}
}
