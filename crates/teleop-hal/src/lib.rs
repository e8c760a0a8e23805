//! `teleop-hal` – input device adapters for the teleoperation stack.
//!
//! Every operator device is reduced to the same shape: raw
//! [`DeviceEvent`][teleop_types::DeviceEvent]s go in, [`Intent`][teleop_types::Intent]s
//! and axis proposals come out.  Nothing in this crate touches the command
//! directly; the arbiter in `teleop-kernel` owns it.
//!
//! # Modules
//!
//! - [`adapter`] – the [`InputAdapter`] trait shared by every device.
//! - [`keyboard`] – held-key state and the fixed-step ramp.
//! - [`joystick`] – on-screen drag joystick, absolute positioning.
//! - [`gamepad`] – stick dead zone, axis inversion, button mapping.
//! - [`registry`] – [`GamepadRegistry`] of connected pads and snapshot diffing.
//! - [`poller`] – [`GamepadPoller`] and its fixed-period polling thread.
//! - [`sim`] – scripted [`SimGamepad`] backend for tests and demos.
//! - `gilrs_source` – native gamepad backend (feature `gilrs`).

pub mod adapter;
pub mod gamepad;
#[cfg(feature = "gilrs")]
pub mod gilrs_source;
pub mod joystick;
pub mod keyboard;
pub mod poller;
pub mod registry;
pub mod sim;

pub use adapter::InputAdapter;
pub use gamepad::{GamepadAdapter, apply_dead_zone};
#[cfg(feature = "gilrs")]
pub use gilrs_source::GilrsSource;
pub use joystick::{DEFAULT_JOYSTICK_SIZE, JoystickAdapter};
pub use keyboard::{DeviceButtonState, KeyboardAdapter, RAMP_STEP};
pub use poller::{GamepadPoller, GamepadSource, PadReading, PollerHandle};
pub use registry::{ConnectedPad, GamepadRegistry, GamepadSnapshot};
pub use sim::SimGamepad;
