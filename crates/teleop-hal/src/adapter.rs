//! [`InputAdapter`] – the capability every operator device implements.

use teleop_types::{AxisProposal, Command, ControlMode, DeviceEvent, Intent};

/// Translates raw device events into controller intents.
///
/// Adapters never write the command.  Continuous value changes are returned
/// as [`Intent::Propose`] and pass through the arbiter's rule chain like any
/// other proposal.
pub trait InputAdapter: Send {
    /// The device family this adapter serves.
    fn control_mode(&self) -> ControlMode;

    /// React to one event from this adapter's device.
    fn handle(&mut self, event: &DeviceEvent) -> Vec<Intent>;

    /// Called on every fast ramp tick with the current command.
    ///
    /// Only devices without analog positions (the keyboard) override this.
    fn ramp(&mut self, _current: Command) -> Vec<AxisProposal> {
        Vec::new()
    }

    /// Drop any held state, e.g. after focus loss or a device switch.
    fn reset(&mut self);
}
