//! [`ModeStateMachine`] – requested vs. reported control authority.
//!
//! `requested` is the operator's intent and is the only value that gates
//! command flow.  `reported` is whatever the vehicle last announced; it is
//! never written locally and a mismatch is surfaced, not enforced.

use teleop_types::Mode;
use tracing::{info, warn};

/// Result of a mode request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: Mode,
    pub to: Mode,
}

impl ModeTransition {
    /// `true` for every request that lands in OFF, including OFF → OFF.
    pub fn enters_off(&self) -> bool {
        self.to == Mode::Off
    }

    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Default)]
pub struct ModeStateMachine {
    requested: Mode,
    reported: Option<Mode>,
}

impl ModeStateMachine {
    /// Start in OFF with no vehicle report.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> Mode {
        self.requested
    }

    /// `None` until the first telemetry frame arrives.
    pub fn reported(&self) -> Option<Mode> {
        self.reported
    }

    /// Set the requested mode directly; there are no intermediate states.
    pub fn request(&mut self, mode: Mode) -> ModeTransition {
        let transition = ModeTransition {
            from: self.requested,
            to: mode,
        };
        self.requested = mode;
        if transition.changed() {
            info!(from = %transition.from, to = %transition.to, "requested mode changed");
        }
        transition
    }

    /// Record the mode announced by the vehicle.
    pub fn observe_reported(&mut self, mode: Mode) {
        if self.reported != Some(mode) {
            info!(reported = %mode, requested = %self.requested, "vehicle reported mode changed");
        }
        self.reported = Some(mode);
        if self.is_mismatched() {
            warn!(reported = %mode, requested = %self.requested, "vehicle mode does not match request");
        }
    }

    /// `true` when the vehicle has reported a mode different from the request.
    pub fn is_mismatched(&self) -> bool {
        self.reported.is_some_and(|reported| reported != self.requested)
    }

    /// Device input may change the command only outside OFF.
    pub fn accepts_input(&self) -> bool {
        self.requested != Mode::Off
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_off_without_report() {
        let machine = ModeStateMachine::new();
        assert_eq!(machine.requested(), Mode::Off);
        assert_eq!(machine.reported(), None);
        assert!(!machine.accepts_input());
        assert!(!machine.is_mismatched());
    }

    #[test]
    fn request_sets_mode_directly() {
        let mut machine = ModeStateMachine::new();
        let t = machine.request(Mode::Auto);
        assert_eq!(t, ModeTransition { from: Mode::Off, to: Mode::Auto });
        assert!(t.changed());
        assert!(!t.enters_off());
        assert!(machine.accepts_input());
    }

    #[test]
    fn off_to_off_still_enters_off() {
        let mut machine = ModeStateMachine::new();
        let t = machine.request(Mode::Off);
        assert!(t.enters_off());
        assert!(!t.changed());
    }

    #[test]
    fn reported_mode_never_gates_input() {
        let mut machine = ModeStateMachine::new();
        machine.request(Mode::Remote);
        machine.observe_reported(Mode::Off);
        assert!(machine.is_mismatched());
        assert!(machine.accepts_input());
        assert_eq!(machine.requested(), Mode::Remote);
    }

    #[test]
    fn mismatch_clears_when_vehicle_catches_up() {
        let mut machine = ModeStateMachine::new();
        machine.request(Mode::Remote);
        machine.observe_reported(Mode::Off);
        machine.observe_reported(Mode::Remote);
        assert!(!machine.is_mismatched());
    }
}
