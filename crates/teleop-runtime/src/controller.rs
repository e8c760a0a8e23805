//! [`Teleop`] – the single owner of all control state.
//!
//! Every mutation of the command, the mode pair, the clock offset and the
//! pending message goes through one `&mut Teleop`, driven by the
//! [`ControlLoop`][crate::control_loop::ControlLoop].  The methods here are
//! synchronous so they can be unit-tested without a runtime.
//!
//! Event routing:
//!
//! - mode buttons and focus changes are accepted from anywhere;
//! - gamepad connection and heartbeat bookkeeping always runs, so the
//!   watchdog knows the pad before it becomes the active device;
//! - an OFF request counts from every device;
//! - every other device event only counts when its device is active.
//!
//! Entering OFF (explicitly, through a stop or by switching the active
//! device) zeroes the command and publishes immediately.

use std::time::Duration;

use teleop_hal::{GamepadAdapter, InputAdapter, JoystickAdapter, KeyboardAdapter};
use teleop_kernel::{
    ClockOffsetEstimator, DeviceHealth, DeviceWatchdog, InputArbiter, ModeStateMachine,
};
use teleop_middleware::{CommandTransport, EventBus, Topic};
use teleop_types::{
    Command, ControlMode, DeviceEvent, Event, EventPayload, Intent, Mode, Settings, Stamp,
    StopReason, VehicleStatus,
};
use tracing::{debug, info, warn};

use crate::scheduler::{PublishScheduler, TickOutcome};

const SOURCE: &str = "teleop-runtime::controller";

/// Static parameters of a [`Teleop`] instance.
#[derive(Debug, Clone)]
pub struct TeleopConfig {
    pub frame_id: String,
    pub settings: Settings,
    pub device_timeout: Duration,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            frame_id: "base_link".to_string(),
            settings: Settings::default(),
            device_timeout: Duration::from_millis(500),
        }
    }
}

pub struct Teleop {
    arbiter: InputArbiter,
    mode: ModeStateMachine,
    clock: ClockOffsetEstimator,
    watchdog: DeviceWatchdog,
    scheduler: PublishScheduler,
    keyboard: KeyboardAdapter,
    joystick: JoystickAdapter,
    gamepad: GamepadAdapter,
    active: ControlMode,
    transport: Box<dyn CommandTransport>,
    bus: EventBus,
    mismatched: bool,
}

impl Teleop {
    /// Build the controller and advertise the configured topic.
    ///
    /// An invalid topic or a failing transport is logged, not fatal:
    /// publishing stays disabled until a valid topic is applied.
    pub fn new(config: TeleopConfig, transport: Box<dyn CommandTransport>, bus: EventBus) -> Self {
        let settings = config.settings;
        let mut teleop = Self {
            arbiter: InputArbiter::new(),
            mode: ModeStateMachine::new(),
            clock: ClockOffsetEstimator::new(),
            watchdog: DeviceWatchdog::new(config.device_timeout),
            scheduler: PublishScheduler::new(
                config.frame_id,
                settings.topic.clone(),
                settings.frequency,
            ),
            keyboard: KeyboardAdapter::new(),
            joystick: JoystickAdapter::default(),
            gamepad: GamepadAdapter::new(settings.dead_zone()),
            active: settings.control_mode,
            transport,
            bus,
            mismatched: false,
        };
        if let Err(e) = teleop.scheduler.advertise(teleop.transport.as_mut()) {
            warn!(error = %e, "command topic not advertised");
        }
        teleop
    }

    /// Replace the default joystick adapter, e.g. for a different widget size.
    pub fn with_joystick(mut self, joystick: JoystickAdapter) -> Self {
        self.joystick = joystick;
        self
    }

    pub fn command(&self) -> Command {
        self.arbiter.command()
    }

    pub fn requested_mode(&self) -> Mode {
        self.mode.requested()
    }

    pub fn reported_mode(&self) -> Option<Mode> {
        self.mode.reported()
    }

    pub fn is_mode_mismatched(&self) -> bool {
        self.mode.is_mismatched()
    }

    pub fn clock(&self) -> &ClockOffsetEstimator {
        &self.clock
    }

    pub fn scheduler(&self) -> &PublishScheduler {
        &self.scheduler
    }

    pub fn active_device(&self) -> ControlMode {
        self.active
    }

    // ────────────────────────────────────────────────────────────────────────
    // Device input
    // ────────────────────────────────────────────────────────────────────────

    pub fn handle_device_event(&mut self, event: DeviceEvent, now: Stamp) {
        match &event {
            DeviceEvent::ModeButton(mode) => {
                self.request_mode(*mode, now);
                return;
            }
            DeviceEvent::FocusLost => {
                self.keyboard.reset();
                self.joystick.reset();
                self.stop(StopReason::FocusLost, now);
                return;
            }
            DeviceEvent::FocusGained => {
                debug!("input focus regained");
                return;
            }
            _ => {}
        }

        let Some(origin) = event.origin() else {
            return;
        };

        let pad_before = self.gamepad.active_pad();
        let intents = self.adapter_mut(origin).handle(&event);

        // Gamepad liveness is tracked whether or not the pad drives.
        if origin == ControlMode::Gamepad {
            self.track_gamepad(&event, pad_before);
        }

        if origin != self.active {
            for intent in intents {
                match intent {
                    Intent::RequestMode(Mode::Off) => self.request_mode(Mode::Off, now),
                    _ => debug!(
                        device = %origin,
                        active = %self.active,
                        "input from inactive device ignored"
                    ),
                }
            }
            return;
        }
        for intent in intents {
            self.apply_intent(intent, now);
        }
    }

    /// Keep the gamepad watchdog on whichever pad currently drives.
    fn track_gamepad(&mut self, event: &DeviceEvent, before: Option<usize>) {
        let after = self.gamepad.active_pad();
        if after != before {
            match after {
                Some(_) => self.watchdog.watch(ControlMode::Gamepad),
                None => self.watchdog.forget(ControlMode::Gamepad),
            }
        } else if let DeviceEvent::GamepadHeartbeat { id } = event
            && after == Some(*id)
        {
            self.watchdog.feed(ControlMode::Gamepad);
        }
    }

    fn apply_intent(&mut self, intent: Intent, now: Stamp) {
        match intent {
            Intent::Propose(proposal) => {
                if self.mode.accepts_input() {
                    self.arbiter.propose(proposal);
                }
            }
            Intent::Neutral => {
                self.arbiter.neutral();
            }
            Intent::RequestMode(mode) => self.request_mode(mode, now),
            Intent::Stop(reason) => self.stop(reason, now),
        }
    }

    fn adapter_mut(&mut self, device: ControlMode) -> &mut dyn InputAdapter {
        match device {
            ControlMode::Keyboard => &mut self.keyboard,
            ControlMode::Joystick => &mut self.joystick,
            ControlMode::Gamepad => &mut self.gamepad,
        }
    }

    /// Fast tick: keyboard ramp and device liveness.
    pub fn ramp_tick(&mut self, now: Stamp) {
        if self.active == ControlMode::Keyboard && self.mode.accepts_input() {
            let current = self.arbiter.command();
            for proposal in self.keyboard.ramp(current) {
                self.arbiter.propose(proposal);
            }
        }

        let timed_out = self.watchdog.health(self.active) == DeviceHealth::TimedOut;
        if self.mode.accepts_input() && timed_out {
            self.stop(StopReason::DeviceTimeout(self.active), now);
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Mode and safety
    // ────────────────────────────────────────────────────────────────────────

    /// Set the requested mode.  Entering OFF zeroes the command and
    /// publishes immediately, even when already OFF.
    pub fn request_mode(&mut self, mode: Mode, now: Stamp) {
        let transition = self.mode.request(mode);
        if transition.enters_off() {
            self.arbiter.neutral();
            let outcome = self.scheduler.publish_immediate(
                self.arbiter.command(),
                Mode::Off,
                &self.clock,
                self.transport.as_mut(),
                now,
            );
            self.report(outcome);
        }
        self.surface_mismatch();
    }

    /// Safety stop: same path as an explicit OFF request, plus an alert.
    pub fn stop(&mut self, reason: StopReason, now: Stamp) {
        warn!(%reason, "safety stop");
        self.alert(EventPayload::SafetyStop { reason });
        self.request_mode(Mode::Off, now);
    }

    // ────────────────────────────────────────────────────────────────────────
    // Telemetry, publishing, settings
    // ────────────────────────────────────────────────────────────────────────

    /// Fold one telemetry frame received at local time `received_at`.
    pub fn on_status(&mut self, status: &VehicleStatus, received_at: Stamp) {
        self.clock.observe(received_at, status.header.stamp);
        self.mode.observe_reported(status.mode);
        self.surface_mismatch();
    }

    pub fn publish_tick(&mut self, now: Stamp) -> TickOutcome {
        let outcome = self.scheduler.tick(
            self.arbiter.command(),
            self.mode.requested(),
            &self.clock,
            self.transport.as_mut(),
            now,
        );
        self.report(outcome.clone());
        outcome
    }

    /// Apply new operator settings.  Returns `true` when the publish
    /// frequency changed and the timer has to be rebuilt.
    pub fn apply_settings(&mut self, settings: &Settings, now: Stamp) -> bool {
        if let Err(e) = self.scheduler.set_topic(&settings.topic, self.transport.as_mut()) {
            warn!(error = %e, "command topic not advertised");
        }
        self.gamepad.set_dead_zone(settings.dead_zone());
        if settings.control_mode != self.active {
            self.switch_device(settings.control_mode, now);
        }
        self.scheduler.set_frequency(settings.frequency)
    }

    /// Hand control to `device`.  The vehicle is stopped first; the
    /// operator re-enters a mode with the new device.
    fn switch_device(&mut self, device: ControlMode, now: Stamp) {
        info!(from = %self.active, to = %device, "active input device changed");
        let previous = self.active;
        self.adapter_mut(previous).reset();
        self.active = device;
        self.stop(StopReason::DeviceSwitched(previous), now);
    }

    fn surface_mismatch(&mut self) {
        let mismatched = self.mode.is_mismatched();
        if mismatched == self.mismatched {
            return;
        }
        self.mismatched = mismatched;
        if let Some(reported) = self.mode.reported() {
            self.alert(EventPayload::ModeReport {
                requested: self.mode.requested(),
                reported,
            });
        }
    }

    fn report(&mut self, outcome: TickOutcome) {
        if let TickOutcome::TransportFailed(e) = outcome {
            warn!(error = %e, topic = self.scheduler.topic(), "command publish failed");
            self.alert(EventPayload::TransportFault {
                topic: self.scheduler.topic().to_string(),
                message: e.to_string(),
            });
        }
    }

    fn alert(&self, payload: EventPayload) {
        // Alerts are best effort; nobody listening is fine.
        let _ = self.bus.publish_to(Topic::SystemAlerts, Event::new(SOURCE, payload));
    }
}
