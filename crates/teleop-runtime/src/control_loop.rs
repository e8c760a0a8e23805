//! [`ControlLoop`] – the one task that drives a [`Teleop`].
//!
//! Sources are polled with `biased` priority:
//!
//! 1. shutdown
//! 2. device events
//! 3. vehicle telemetry
//! 4. settings updates
//! 5. the fast ramp interval
//! 6. the publish interval
//!
//! so queued input and mode changes are always folded in before the next
//! publish reads the command.  Both intervals skip missed ticks instead of
//! bursting to catch up.

use std::future;
use std::time::Duration;

use teleop_middleware::TopicReceiver;
use teleop_types::{DeviceEvent, EventPayload, Settings, Stamp, StopReason};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::controller::Teleop;

/// Default period of the keyboard ramp / liveness tick.
pub const DEFAULT_RAMP_PERIOD: Duration = Duration::from_millis(1);

/// Receiving ends the loop consumes.
pub struct LoopInputs {
    pub devices: mpsc::Receiver<DeviceEvent>,
    pub telemetry: TopicReceiver,
    pub settings: watch::Receiver<Settings>,
    /// Set to `true` to stop the loop.
    pub shutdown: watch::Receiver<bool>,
}

pub struct ControlLoop {
    teleop: Teleop,
    inputs: LoopInputs,
    ramp_period: Duration,
}

fn interval_for(period: Option<Duration>) -> Option<Interval> {
    period.map(|period| {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    })
}

/// Resolves on the next tick, or never when publishing is disabled.
async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

impl ControlLoop {
    pub fn new(teleop: Teleop, inputs: LoopInputs) -> Self {
        Self {
            teleop,
            inputs,
            ramp_period: DEFAULT_RAMP_PERIOD,
        }
    }

    pub fn with_ramp_period(mut self, period: Duration) -> Self {
        self.ramp_period = period;
        self
    }

    /// Run until shutdown is signalled (or its sender is dropped).
    ///
    /// Shutdown takes the OFF path, so the vehicle receives a final stop
    /// message.  Returns the controller for inspection.
    pub async fn run(self) -> Teleop {
        let Self {
            mut teleop,
            inputs,
            ramp_period,
        } = self;
        let LoopInputs {
            mut devices,
            mut telemetry,
            mut settings,
            mut shutdown,
        } = inputs;

        let mut ramp = interval_for(Some(ramp_period));
        let mut publish = interval_for(teleop.scheduler().period());
        let mut devices_open = true;
        let mut telemetry_open = true;
        let mut settings_open = true;

        info!(
            device = %teleop.active_device(),
            frequency = teleop.scheduler().frequency(),
            topic = teleop.scheduler().topic(),
            "control loop started"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        teleop.stop(StopReason::Shutdown, Stamp::now());
                        break;
                    }
                }

                event = devices.recv(), if devices_open => match event {
                    Some(event) => teleop.handle_device_event(event, Stamp::now()),
                    None => {
                        debug!("device queue closed");
                        devices_open = false;
                    }
                },

                event = telemetry.recv(), if telemetry_open => match event {
                    Ok(event) => {
                        if let EventPayload::VehicleStatus(status) = &event.payload {
                            teleop.on_status(status, Stamp::from(event.timestamp));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "telemetry lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("telemetry closed");
                        telemetry_open = false;
                    }
                },

                changed = settings.changed(), if settings_open => {
                    if changed.is_err() {
                        settings_open = false;
                    } else {
                        let update = settings.borrow_and_update().clone();
                        if teleop.apply_settings(&update, Stamp::now()) {
                            publish = interval_for(teleop.scheduler().period());
                        }
                    }
                }

                _ = next_tick(&mut ramp) => teleop.ramp_tick(Stamp::now()),

                _ = next_tick(&mut publish) => {
                    teleop.publish_tick(Stamp::now());
                }
            }
        }

        info!("control loop stopped");
        teleop
    }
}
