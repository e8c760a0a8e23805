//! On-screen drag joystick.
//!
//! The drag origin is recorded on start; every move proposes absolute
//! values relative to it, normalised by half the joystick size.  Screen `y`
//! grows downward, so dragging up yields positive velocity.  Letting go
//! returns the command to neutral.

use teleop_types::{AxisProposal, ControlMode, DeviceEvent, Intent, TeleopError};

use crate::adapter::InputAdapter;

/// Edge length of the on-screen joystick, in pixels.
pub const DEFAULT_JOYSTICK_SIZE: f64 = 100.0;

#[derive(Debug)]
pub struct JoystickAdapter {
    half_size: f64,
    origin: Option<(f64, f64)>,
}

impl JoystickAdapter {
    /// # Errors
    ///
    /// [`TeleopError::DeviceUnavailable`] when `size` is not a positive finite
    /// number.
    pub fn new(size: f64) -> Result<Self, TeleopError> {
        if !size.is_finite() || size <= 0.0 {
            return Err(TeleopError::DeviceUnavailable(format!(
                "joystick size must be positive, got {size}"
            )));
        }
        Ok(Self {
            half_size: size / 2.0,
            origin: None,
        })
    }

    pub fn is_dragging(&self) -> bool {
        self.origin.is_some()
    }
}

impl Default for JoystickAdapter {
    fn default() -> Self {
        Self {
            half_size: DEFAULT_JOYSTICK_SIZE / 2.0,
            origin: None,
        }
    }
}

impl InputAdapter for JoystickAdapter {
    fn control_mode(&self) -> ControlMode {
        ControlMode::Joystick
    }

    fn handle(&mut self, event: &DeviceEvent) -> Vec<Intent> {
        match *event {
            DeviceEvent::JoystickStart { x, y } => {
                self.origin = Some((x, y));
                Vec::new()
            }
            DeviceEvent::JoystickMove { x, y } => {
                let Some((start_x, start_y)) = self.origin else {
                    return Vec::new();
                };
                let steering = (x - start_x) / self.half_size;
                let velocity = (start_y - y) / self.half_size;
                vec![
                    Intent::Propose(AxisProposal::velocity(velocity)),
                    Intent::Propose(AxisProposal::steering(steering)),
                ]
            }
            DeviceEvent::JoystickEnd => {
                self.origin = None;
                vec![Intent::Neutral]
            }
            _ => Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.origin = None;
    }
}
