//! `teleop-runtime` – the arbiter-and-publisher loop.
//!
//! # Modules
//!
//! - [`scheduler`] – [`PublishScheduler`]: fixed-rate publication of the
//!   single pending command message, corrected into the vehicle's clock.
//! - [`controller`] – [`Teleop`]: owns the arbiter, mode pair, clock offset,
//!   watchdog, device adapters and scheduler, and routes every event.
//! - [`control_loop`] – [`ControlLoop`]: the async task multiplexing device
//!   events, telemetry, settings and both timers onto one `Teleop`.
//! - [`telemetry`] – [`init_tracing`]: global `tracing` subscriber with an
//!   optional OTLP span exporter.

pub mod control_loop;
pub mod controller;
pub mod scheduler;
pub mod telemetry;

pub use control_loop::{ControlLoop, DEFAULT_RAMP_PERIOD, LoopInputs};
pub use controller::{Teleop, TeleopConfig};
pub use scheduler::{PublishScheduler, TickOutcome, validate_topic};
pub use telemetry::{TracerProviderGuard, init_tracing};
