//! `teleop-kernel` – Safety core
//!
//! Owns the rules that decide what the vehicle is allowed to be told. It does
//! no I/O; every type here is driven synchronously by `teleop-runtime`.
//!
//! # Modules
//!
//! - [`arbiter`] – [`InputArbiter`][arbiter::InputArbiter]: applies an ordered
//!   list of [`AxisRule`][arbiter::AxisRule]s (zero-crossing interlock, unit
//!   clamp, two-decimal rounding) to every axis proposal, whichever device it
//!   came from.
//! - [`mode`] – [`ModeStateMachine`][mode::ModeStateMachine]: the locally
//!   requested mode and the mode last reported by the vehicle.
//! - [`clock`] – [`ClockOffsetEstimator`][clock::ClockOffsetEstimator]:
//!   last-value skew between the local clock and the vehicle clock.
//! - [`watchdog`] – [`DeviceWatchdog`][watchdog::DeviceWatchdog]: heartbeat
//!   deadlines for polled input devices.

pub mod arbiter;
pub mod clock;
pub mod mode;
pub mod watchdog;

pub use arbiter::{AxisRule, CentiRounding, InputArbiter, UnitClamp, ZeroCrossingInterlock};
pub use clock::ClockOffsetEstimator;
pub use mode::{ModeStateMachine, ModeTransition};
pub use watchdog::{DeviceHealth, DeviceWatchdog};
