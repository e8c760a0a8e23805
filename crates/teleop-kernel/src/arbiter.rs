//! [`InputArbiter`] – the single writer of the operator [`Command`].
//!
//! Every device adapter hands the arbiter an [`AxisProposal`]; the arbiter
//! runs it through its registered [`AxisRule`]s in order and stores the
//! result.  The default rule chain is:
//!
//! 1. [`ZeroCrossingInterlock`] – a proposal whose sign is opposite to the
//!    current non-zero value yields exactly `0`.
//! 2. [`UnitClamp`] – clamps into `[-1, 1]`.
//! 3. [`CentiRounding`] – rounds to two decimals.
//!
//! The same chain applies to keyboard ramps, joystick drags and gamepad
//! sticks, so a new device cannot bypass the safety policy.

use teleop_types::{Axis, AxisProposal, Command};
use tracing::trace;

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// One step of the arbitration pipeline for a single axis.
pub trait AxisRule: Send + Sync {
    /// Short name used in trace output.
    fn name(&self) -> &str;

    /// Map `proposed` to the value that may replace `current` on `axis`.
    fn apply(&self, axis: Axis, current: f64, proposed: f64) -> f64;
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Forces an axis through neutral instead of reversing direction in one step.
pub struct ZeroCrossingInterlock;

impl AxisRule for ZeroCrossingInterlock {
    fn name(&self) -> &str {
        "zero_crossing_interlock"
    }

    fn apply(&self, _axis: Axis, current: f64, proposed: f64) -> f64 {
        if current != 0.0 && proposed != 0.0 && current.signum() != proposed.signum() {
            0.0
        } else {
            proposed
        }
    }
}

/// Keeps an axis inside `[-1, 1]`.  A NaN proposal is treated as neutral.
pub struct UnitClamp;

impl AxisRule for UnitClamp {
    fn name(&self) -> &str {
        "unit_clamp"
    }

    fn apply(&self, _axis: Axis, _current: f64, proposed: f64) -> f64 {
        if proposed.is_nan() {
            0.0
        } else {
            proposed.clamp(-1.0, 1.0)
        }
    }
}

/// Rounds to two decimal places, half away from zero.
pub struct CentiRounding;

impl AxisRule for CentiRounding {
    fn name(&self) -> &str {
        "centi_rounding"
    }

    fn apply(&self, _axis: Axis, _current: f64, proposed: f64) -> f64 {
        round_centi(proposed)
    }
}

/// Round `value` to two decimals.  Negative zero is normalised to `0.0`.
pub fn round_centi(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}

// ────────────────────────────────────────────────────────────────────────────
// InputArbiter
// ────────────────────────────────────────────────────────────────────────────

/// Holds the current [`Command`] and applies axis rules to every proposal.
///
/// # Example
///
/// ```
/// use teleop_kernel::InputArbiter;
/// use teleop_types::AxisProposal;
///
/// let mut arbiter = InputArbiter::new();
/// arbiter.propose(AxisProposal::velocity(0.6));
///
/// // Reversal is never direct: the axis stops at zero first.
/// let cmd = arbiter.propose(AxisProposal::velocity(-0.3));
/// assert_eq!(cmd.velocity, 0.0);
/// ```
pub struct InputArbiter {
    command: Command,
    rules: Vec<Box<dyn AxisRule>>,
}

impl InputArbiter {
    /// Arbiter with the standard interlock → clamp → rounding chain.
    pub fn new() -> Self {
        Self::with_rules(vec![
            Box::new(ZeroCrossingInterlock),
            Box::new(UnitClamp),
            Box::new(CentiRounding),
        ])
    }

    /// Arbiter with a caller-supplied rule chain, evaluated in order.
    pub fn with_rules(rules: Vec<Box<dyn AxisRule>>) -> Self {
        Self {
            command: Command::NEUTRAL,
            rules,
        }
    }

    pub fn add_rule(&mut self, rule: Box<dyn AxisRule>) {
        self.rules.push(rule);
    }

    pub fn command(&self) -> Command {
        self.command
    }

    /// Apply `proposal` to its axis and return the updated command.
    pub fn propose(&mut self, proposal: AxisProposal) -> Command {
        let current = self.command.axis(proposal.axis);
        let value = self.rules.iter().fold(proposal.value, |value, rule| {
            let next = rule.apply(proposal.axis, current, value);
            if next != value {
                trace!(rule = rule.name(), axis = ?proposal.axis, from = value, to = next, "axis rule adjusted proposal");
            }
            next
        });
        self.command.set_axis(proposal.axis, value);
        self.command
    }

    /// Return both axes to zero.
    pub fn neutral(&mut self) -> Command {
        self.command = Command::NEUTRAL;
        self.command
    }
}

impl Default for InputArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interlock_forces_zero_on_reversal() {
        let mut arbiter = InputArbiter::new();
        arbiter.propose(AxisProposal::velocity(0.6));
        let cmd = arbiter.propose(AxisProposal::velocity(-0.3));
        assert_eq!(cmd.velocity, 0.0);

        // From zero the new sign is accepted.
        let cmd = arbiter.propose(AxisProposal::velocity(-0.3));
        assert_eq!(cmd.velocity, -0.3);
    }

    #[test]
    fn interlock_is_per_axis() {
        let mut arbiter = InputArbiter::new();
        arbiter.propose(AxisProposal::steering(-0.5));
        arbiter.propose(AxisProposal::velocity(0.4));

        let cmd = arbiter.propose(AxisProposal::steering(0.2));
        assert_eq!(cmd.steering, 0.0);
        assert_eq!(cmd.velocity, 0.4);
    }

    #[test]
    fn same_sign_and_zero_proposals_pass() {
        let mut arbiter = InputArbiter::new();
        arbiter.propose(AxisProposal::velocity(0.2));
        assert_eq!(arbiter.propose(AxisProposal::velocity(0.9)).velocity, 0.9);
        assert_eq!(arbiter.propose(AxisProposal::velocity(0.0)).velocity, 0.0);
    }

    #[test]
    fn values_are_clamped_and_rounded() {
        let mut arbiter = InputArbiter::new();
        assert_eq!(arbiter.propose(AxisProposal::steering(3.7)).steering, 1.0);
        arbiter.neutral();
        assert_eq!(arbiter.propose(AxisProposal::steering(-0.456)).steering, -0.46);
        arbiter.neutral();
        assert_eq!(arbiter.propose(AxisProposal::velocity(0.004)).velocity, 0.0);
    }

    #[test]
    fn nan_proposal_is_neutral() {
        let mut arbiter = InputArbiter::new();
        assert_eq!(arbiter.propose(AxisProposal::velocity(f64::NAN)).velocity, 0.0);
    }

    #[test]
    fn rounding_never_yields_negative_zero() {
        assert!(round_centi(-0.001).is_sign_positive());
    }

    #[test]
    fn command_stays_within_unit_range_for_any_sequence() {
        let mut arbiter = InputArbiter::new();
        // Small deterministic LCG so the sequence is reproducible.
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        for _ in 0..10_000 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let raw = ((seed >> 11) as f64 / (1u64 << 53) as f64) * 8.0 - 4.0;
            let proposal = if seed & 1 == 0 {
                AxisProposal::velocity(raw)
            } else {
                AxisProposal::steering(raw)
            };
            let cmd = arbiter.propose(proposal);
            assert!(cmd.velocity.abs() <= 1.0, "velocity escaped: {}", cmd.velocity);
            assert!(cmd.steering.abs() <= 1.0, "steering escaped: {}", cmd.steering);
        }
    }

    #[test]
    fn custom_rule_chain_runs_in_order() {
        struct HalfSpeed;
        impl AxisRule for HalfSpeed {
            fn name(&self) -> &str {
                "half_speed"
            }
            fn apply(&self, axis: Axis, _current: f64, proposed: f64) -> f64 {
                if axis == Axis::Velocity { proposed * 0.5 } else { proposed }
            }
        }

        let mut arbiter = InputArbiter::new();
        arbiter.add_rule(Box::new(HalfSpeed));
        assert_eq!(arbiter.propose(AxisProposal::velocity(0.8)).velocity, 0.4);
        assert_eq!(arbiter.propose(AxisProposal::steering(0.8)).steering, 0.8);
    }

    #[test]
    fn neutral_resets_both_axes() {
        let mut arbiter = InputArbiter::new();
        arbiter.propose(AxisProposal::velocity(0.7));
        arbiter.propose(AxisProposal::steering(-0.7));
        assert!(arbiter.neutral().is_neutral());
        assert!(arbiter.command().is_neutral());
    }
}
