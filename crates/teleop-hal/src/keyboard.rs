//! Keyboard adapter.
//!
//! Arrow keys (or WASD, mapped by the terminal reader) set held flags in a
//! [`DeviceButtonState`].  On every ramp tick each axis moves toward its
//! target by [`RAMP_STEP`]:
//!
//! | held keys          | proposal                              |
//! |--------------------|---------------------------------------|
//! | both opposing      | `0`                                   |
//! | one direction `t`  | `t · min(|c| + step, 1)`              |
//! | none, `c ≠ 0`      | `sign(c) · max(|c| − step, 0)`        |
//! | none, `c = 0`      | nothing                               |
//!
//! Reversing while the axis is still moving the other way produces a
//! proposal of the opposite sign, which the arbiter's interlock turns into
//! an exact `0`.

use teleop_types::{AxisProposal, Command, ControlMode, DeviceEvent, Intent, Key, Mode};

use crate::adapter::InputAdapter;

/// Change applied to a ramping axis on every ramp tick.
pub const RAMP_STEP: f64 = 0.05;

/// Which direction keys are currently held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceButtonState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl DeviceButtonState {
    /// Apply a key transition.  Returns `false` for non-direction keys.
    pub fn apply(&mut self, key: Key, pressed: bool) -> bool {
        let flag = match key {
            Key::Up => &mut self.up,
            Key::Down => &mut self.down,
            Key::Left => &mut self.left,
            Key::Right => &mut self.right,
            Key::ModeOff | Key::ModeRemote | Key::ModeAuto => return false,
        };
        *flag = pressed;
        true
    }

    pub fn any_held(&self) -> bool {
        self.up || self.down || self.left || self.right
    }
}

/// Next proposal for one axis given its positive/negative keys.
fn ramp_axis(positive: bool, negative: bool, current: f64) -> Option<f64> {
    match (positive, negative) {
        (true, true) => Some(0.0),
        (true, false) => Some((current.abs() + RAMP_STEP).min(1.0)),
        (false, true) => Some(-(current.abs() + RAMP_STEP).min(1.0)),
        (false, false) if current != 0.0 => {
            Some(current.signum() * (current.abs() - RAMP_STEP).max(0.0))
        }
        (false, false) => None,
    }
}

#[derive(Debug, Default)]
pub struct KeyboardAdapter {
    buttons: DeviceButtonState,
}

impl KeyboardAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buttons(&self) -> DeviceButtonState {
        self.buttons
    }
}

impl InputAdapter for KeyboardAdapter {
    fn control_mode(&self) -> ControlMode {
        ControlMode::Keyboard
    }

    fn handle(&mut self, event: &DeviceEvent) -> Vec<Intent> {
        let DeviceEvent::Key { key, pressed } = *event else {
            return Vec::new();
        };
        if self.buttons.apply(key, pressed) || !pressed {
            return Vec::new();
        }
        match key {
            Key::ModeOff => vec![Intent::RequestMode(Mode::Off)],
            Key::ModeRemote => vec![Intent::RequestMode(Mode::Remote)],
            Key::ModeAuto => vec![Intent::RequestMode(Mode::Auto)],
            Key::Up | Key::Down | Key::Left | Key::Right => Vec::new(),
        }
    }

    fn ramp(&mut self, current: Command) -> Vec<AxisProposal> {
        let velocity = ramp_axis(self.buttons.up, self.buttons.down, current.velocity)
            .map(AxisProposal::velocity);
        let steering = ramp_axis(self.buttons.right, self.buttons.left, current.steering)
            .map(AxisProposal::steering);
        velocity.into_iter().chain(steering).collect()
    }

    fn reset(&mut self) {
        self.buttons = DeviceButtonState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(key: Key) -> DeviceEvent {
        DeviceEvent::Key { key, pressed: true }
    }

    fn release(key: Key) -> DeviceEvent {
        DeviceEvent::Key { key, pressed: false }
    }

    #[test]
    fn direction_keys_only_update_state() {
        let mut kb = KeyboardAdapter::new();
        assert!(kb.handle(&press(Key::Up)).is_empty());
        assert!(kb.buttons().up);
        assert!(kb.handle(&release(Key::Up)).is_empty());
        assert!(!kb.buttons().any_held());
    }

    #[test]
    fn mode_shortcuts_fire_on_press_only() {
        let mut kb = KeyboardAdapter::new();
        assert_eq!(kb.handle(&press(Key::ModeRemote)), vec![Intent::RequestMode(Mode::Remote)]);
        assert_eq!(kb.handle(&press(Key::ModeAuto)), vec![Intent::RequestMode(Mode::Auto)]);
        assert_eq!(kb.handle(&press(Key::ModeOff)), vec![Intent::RequestMode(Mode::Off)]);
        assert!(kb.handle(&release(Key::ModeOff)).is_empty());
    }

    #[test]
    fn forward_ramp_proposes_next_step() {
        let mut kb = KeyboardAdapter::new();
        kb.handle(&press(Key::Up));
        let proposals = kb.ramp(Command { velocity: 0.35, steering: 0.0 });
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].axis, teleop_types::Axis::Velocity);
        assert!((proposals[0].value - 0.40).abs() < 1e-9);
    }

    #[test]
    fn ramp_saturates_at_one() {
        let mut kb = KeyboardAdapter::new();
        kb.handle(&press(Key::Right));
        let proposals = kb.ramp(Command { velocity: 0.0, steering: 0.98 });
        assert_eq!(proposals, vec![AxisProposal::steering(1.0)]);
    }

    #[test]
    fn release_decays_toward_zero_without_overshoot() {
        let mut kb = KeyboardAdapter::new();
        let proposals = kb.ramp(Command { velocity: -0.03, steering: 0.0 });
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].value, 0.0);
    }

    #[test]
    fn idle_keyboard_at_rest_proposes_nothing() {
        let mut kb = KeyboardAdapter::new();
        assert!(kb.ramp(Command::NEUTRAL).is_empty());
    }

    #[test]
    fn opposing_keys_propose_zero() {
        let mut kb = KeyboardAdapter::new();
        kb.handle(&press(Key::Left));
        kb.handle(&press(Key::Right));
        assert_eq!(
            kb.ramp(Command { velocity: 0.0, steering: -0.4 }),
            vec![AxisProposal::steering(0.0)]
        );
    }

    #[test]
    fn reversal_proposes_opposite_sign() {
        let mut kb = KeyboardAdapter::new();
        kb.handle(&press(Key::Down));
        let proposals = kb.ramp(Command { velocity: 0.5, steering: 0.0 });
        assert!(proposals[0].value < 0.0);
    }

    #[test]
    fn reset_clears_held_keys() {
        let mut kb = KeyboardAdapter::new();
        kb.handle(&press(Key::Up));
        kb.handle(&press(Key::Left));
        kb.reset();
        assert!(!kb.buttons().any_held());
    }

    #[test]
    fn foreign_events_are_ignored() {
        let mut kb = KeyboardAdapter::new();
        assert!(kb.handle(&DeviceEvent::JoystickEnd).is_empty());
    }
}
