//! `teleop-types` – shared data model for the teleoperation stack.
//!
//! Everything that crosses a crate boundary lives here: the arbitrated
//! [`Command`], the tri-state [`Mode`], the outbound [`ControlCommand`]
//! message, inbound [`VehicleStatus`] telemetry, the raw [`DeviceEvent`]s
//! produced by input hardware, the [`Intent`]s adapters derive from them, the
//! bus [`Event`] envelope and the global [`TeleopError`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Mode
// ────────────────────────────────────────────────────────────────────────────

/// Operational state of control authority.
///
/// Serialised as its integer wire value (`0`, `1`, `2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Mode {
    /// No actuation. The vehicle must hold still.
    #[default]
    Off,
    /// This operator drives.
    Remote,
    /// Onboard autonomy drives.
    Auto,
}

impl Mode {
    /// Integer value carried in the `mode` field of wire messages.
    pub fn as_u8(self) -> u8 {
        match self {
            Mode::Off => 0,
            Mode::Remote => 1,
            Mode::Auto => 2,
        }
    }
}

impl TryFrom<u8> for Mode {
    type Error = TeleopError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Off),
            1 => Ok(Mode::Remote),
            2 => Ok(Mode::Auto),
            other => Err(TeleopError::InvalidMode(other)),
        }
    }
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> Self {
        mode.as_u8()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Off => write!(f, "OFF"),
            Mode::Remote => write!(f, "REMOTE"),
            Mode::Auto => write!(f, "AUTO"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Command
// ────────────────────────────────────────────────────────────────────────────

/// One of the two command axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Forward (+) / backward (-).
    Velocity,
    /// Right (+) / left (-).
    Steering,
}

/// The authoritative operator intent.
///
/// Both fields stay within `[-1, 1]` and carry at most two decimals once
/// they have passed through the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Command {
    pub velocity: f64,
    pub steering: f64,
}

impl Command {
    /// The `(0, 0)` command.
    pub const NEUTRAL: Command = Command {
        velocity: 0.0,
        steering: 0.0,
    };

    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Velocity => self.velocity,
            Axis::Steering => self.steering,
        }
    }

    pub fn set_axis(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::Velocity => self.velocity = value,
            Axis::Steering => self.steering = value,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.velocity == 0.0 && self.steering == 0.0
    }
}

/// A candidate value for one axis, produced by exactly one device adapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisProposal {
    pub axis: Axis,
    pub value: f64,
}

impl AxisProposal {
    pub fn velocity(value: f64) -> Self {
        Self {
            axis: Axis::Velocity,
            value,
        }
    }

    pub fn steering(value: f64) -> Self {
        Self {
            axis: Axis::Steering,
            value,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Time
// ────────────────────────────────────────────────────────────────────────────

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Wall-clock timestamp split into whole seconds and nanoseconds, as carried
/// in message headers.  `nsec` is always normalised into `0..1_000_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Stamp {
    pub sec: i64,
    pub nsec: u32,
}

impl Stamp {
    pub fn new(sec: i64, nsec: u32) -> Self {
        Self::from_nanos(sec as i128 * NANOS_PER_SEC + nsec as i128)
    }

    /// Current local wall-clock time.
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// Total signed nanoseconds since the Unix epoch.
    pub fn as_nanos(&self) -> i128 {
        self.sec as i128 * NANOS_PER_SEC + self.nsec as i128
    }

    pub fn from_nanos(nanos: i128) -> Self {
        Self {
            sec: nanos.div_euclid(NANOS_PER_SEC) as i64,
            nsec: nanos.rem_euclid(NANOS_PER_SEC) as u32,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.nsec as f64 * 1e-9
    }
}

impl From<DateTime<Utc>> for Stamp {
    fn from(time: DateTime<Utc>) -> Self {
        // `timestamp_subsec_nanos` exceeds 1e9 during a leap second.
        Self::new(time.timestamp(), time.timestamp_subsec_nanos())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wire messages
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub frame_id: String,
    pub stamp: Stamp,
}

/// Outbound command message.
///
/// One instance is owned by the publish scheduler and rewritten in place on
/// every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub header: Header,
    pub mode: Mode,
    /// Steering.
    pub curvature_ratio: f64,
    /// Velocity.
    pub velocity_ratio: f64,
}

impl ControlCommand {
    pub fn new(frame_id: impl Into<String>) -> Self {
        Self {
            header: Header {
                frame_id: frame_id.into(),
                stamp: Stamp::default(),
            },
            mode: Mode::Off,
            curvature_ratio: 0.0,
            velocity_ratio: 0.0,
        }
    }
}

/// Inbound vehicle status frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub header: Header,
    pub mode: Mode,
}

// ────────────────────────────────────────────────────────────────────────────
// Devices
// ────────────────────────────────────────────────────────────────────────────

/// Which device adapter currently drives the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    #[default]
    Keyboard,
    Joystick,
    Gamepad,
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::Keyboard => write!(f, "keyboard"),
            ControlMode::Joystick => write!(f, "joystick"),
            ControlMode::Gamepad => write!(f, "gamepad"),
        }
    }
}

impl FromStr for ControlMode {
    type Err = TeleopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyboard" => Ok(ControlMode::Keyboard),
            "joystick" => Ok(ControlMode::Joystick),
            "gamepad" => Ok(ControlMode::Gamepad),
            other => Err(TeleopError::Config(format!("unknown control mode '{other}'"))),
        }
    }
}

/// Logical keys understood by the keyboard adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    ModeOff,
    ModeRemote,
    ModeAuto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StickAxis {
    LeftStickX,
    LeftStickY,
    RightStickX,
    RightStickY,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PadButton {
    South,
    East,
    North,
    West,
    LeftTrigger,
    RightTrigger,
    Start,
    Select,
}

/// Raw event from an input device, queued for the control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceEvent {
    Key { key: Key, pressed: bool },
    JoystickStart { x: f64, y: f64 },
    JoystickMove { x: f64, y: f64 },
    JoystickEnd,
    GamepadConnected { id: usize, name: String },
    GamepadDisconnected { id: usize },
    GamepadAxis { id: usize, axis: StickAxis, value: f64 },
    GamepadButton { id: usize, button: PadButton, pressed: bool },
    /// Emitted on every poll of a connected gamepad.
    GamepadHeartbeat { id: usize },
    /// On-screen mode button; accepted regardless of the active device.
    ModeButton(Mode),
    FocusLost,
    FocusGained,
}

impl DeviceEvent {
    /// The device family that produced this event, or `None` for events that
    /// do not belong to a single adapter.
    pub fn origin(&self) -> Option<ControlMode> {
        match self {
            DeviceEvent::Key { .. } => Some(ControlMode::Keyboard),
            DeviceEvent::JoystickStart { .. }
            | DeviceEvent::JoystickMove { .. }
            | DeviceEvent::JoystickEnd => Some(ControlMode::Joystick),
            DeviceEvent::GamepadConnected { .. }
            | DeviceEvent::GamepadDisconnected { .. }
            | DeviceEvent::GamepadAxis { .. }
            | DeviceEvent::GamepadButton { .. }
            | DeviceEvent::GamepadHeartbeat { .. } => Some(ControlMode::Gamepad),
            DeviceEvent::ModeButton(_) | DeviceEvent::FocusLost | DeviceEvent::FocusGained => None,
        }
    }
}

/// Why the controller forced a stop outside an explicit OFF request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    FocusLost,
    DeviceDisconnected(ControlMode),
    DeviceTimeout(ControlMode),
    /// The active input device was changed away from this one.
    DeviceSwitched(ControlMode),
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::FocusLost => write!(f, "input focus lost"),
            StopReason::DeviceDisconnected(device) => write!(f, "{device} disconnected"),
            StopReason::DeviceTimeout(device) => write!(f, "{device} stopped responding"),
            StopReason::DeviceSwitched(device) => write!(f, "{device} no longer drives"),
            StopReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// What an adapter wants the controller to do in response to a device event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    Propose(AxisProposal),
    /// Return both axes to zero without leaving the current mode.
    Neutral,
    RequestMode(Mode),
    /// Escalate to the OFF path.
    Stop(StopReason),
}

// ────────────────────────────────────────────────────────────────────────────
// Settings
// ────────────────────────────────────────────────────────────────────────────

/// Operator-editable settings consumed by the control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Destination topic for command messages.
    pub topic: String,
    /// Publish rate in Hz. Non-positive disables periodic publishing.
    pub frequency: f64,
    pub gamepad_dead_zone: f64,
    pub control_mode: ControlMode,
}

impl Settings {
    /// The dead zone clamped into `[0, 1]`.
    pub fn dead_zone(&self) -> f64 {
        if self.gamepad_dead_zone.is_nan() {
            return 0.0;
        }
        self.gamepad_dead_zone.clamp(0.0, 1.0)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            topic: "/vehicle/control".to_string(),
            frequency: 60.0,
            gamepad_dead_zone: 0.1,
            control_mode: ControlMode::Keyboard,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bus events
// ────────────────────────────────────────────────────────────────────────────

/// Envelope routed over the internal event bus.
///
/// For [`EventPayload::VehicleStatus`] the `timestamp` is the local time the
/// frame was received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"teleop-middleware::rosbridge"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    VehicleStatus(VehicleStatus),
    CommandPublished { topic: String, message: ControlCommand },
    ModeReport { requested: Mode, reported: Mode },
    SafetyStop { reason: StopReason },
    TransportFault { topic: String, message: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every crate in the workspace.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TeleopError {
    #[error("Invalid topic '{0}': must be non-empty and start with '/'")]
    InvalidTopic(String),

    #[error("Invalid mode value {0}")]
    InvalidMode(u8),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Parse error: {0}")]
    Parsing(String),

    #[error("Config error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_wire_values() {
        assert_eq!(Mode::Off.as_u8(), 0);
        assert_eq!(Mode::Remote.as_u8(), 1);
        assert_eq!(Mode::Auto.as_u8(), 2);
        assert_eq!(Mode::try_from(2u8).unwrap(), Mode::Auto);
        assert_eq!(Mode::try_from(7u8), Err(TeleopError::InvalidMode(7)));
    }

    #[test]
    fn control_command_serialises_to_wire_shape() {
        let mut msg = ControlCommand::new("base_link");
        msg.header.stamp = Stamp::new(12, 500);
        msg.mode = Mode::Remote;
        msg.curvature_ratio = -0.25;
        msg.velocity_ratio = 0.5;

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["header"]["frame_id"], "base_link");
        assert_eq!(json["header"]["stamp"]["sec"], 12);
        assert_eq!(json["header"]["stamp"]["nsec"], 500);
        assert_eq!(json["mode"], 1);
        assert_eq!(json["curvature_ratio"], -0.25);
        assert_eq!(json["velocity_ratio"], 0.5);
    }

    #[test]
    fn vehicle_status_parses_without_frame_id() {
        let raw = r#"{"header":{"stamp":{"sec":100,"nsec":250000000}},"mode":2}"#;
        let status: VehicleStatus = serde_json::from_str(raw).unwrap();
        assert_eq!(status.mode, Mode::Auto);
        assert_eq!(status.header.stamp, Stamp::new(100, 250_000_000));
        assert!(status.header.frame_id.is_empty());
    }

    #[test]
    fn vehicle_status_rejects_unknown_mode() {
        let raw = r#"{"header":{"stamp":{"sec":1,"nsec":0}},"mode":9}"#;
        assert!(serde_json::from_str::<VehicleStatus>(raw).is_err());
    }

    #[test]
    fn stamp_normalises_nanoseconds() {
        let stamp = Stamp::new(1, 1_500_000_000);
        assert_eq!(stamp, Stamp { sec: 2, nsec: 500_000_000 });

        let negative = Stamp::from_nanos(-1);
        assert_eq!(negative, Stamp { sec: -1, nsec: 999_999_999 });
        assert_eq!(negative.as_nanos(), -1);
    }

    #[test]
    fn stamp_from_chrono() {
        let time = DateTime::<Utc>::from_timestamp(1_700_000_000, 123).unwrap();
        let stamp = Stamp::from(time);
        assert_eq!(stamp.sec, 1_700_000_000);
        assert_eq!(stamp.nsec, 123);
    }

    #[test]
    fn command_axis_accessors() {
        let mut cmd = Command::NEUTRAL;
        assert!(cmd.is_neutral());
        cmd.set_axis(Axis::Steering, -0.4);
        assert_eq!(cmd.axis(Axis::Steering), -0.4);
        assert_eq!(cmd.axis(Axis::Velocity), 0.0);
        assert!(!cmd.is_neutral());
    }

    #[test]
    fn control_mode_parses_case_insensitively() {
        assert_eq!("Gamepad".parse::<ControlMode>().unwrap(), ControlMode::Gamepad);
        assert!(matches!(
            "mouse".parse::<ControlMode>(),
            Err(TeleopError::Config(_))
        ));
    }

    #[test]
    fn settings_dead_zone_is_clamped() {
        let mut settings = Settings::default();
        settings.gamepad_dead_zone = 3.0;
        assert_eq!(settings.dead_zone(), 1.0);
        settings.gamepad_dead_zone = -0.5;
        assert_eq!(settings.dead_zone(), 0.0);
    }

    #[test]
    fn device_event_origin() {
        assert_eq!(
            DeviceEvent::Key { key: Key::Up, pressed: true }.origin(),
            Some(ControlMode::Keyboard)
        );
        assert_eq!(DeviceEvent::JoystickEnd.origin(), Some(ControlMode::Joystick));
        assert_eq!(
            DeviceEvent::GamepadHeartbeat { id: 0 }.origin(),
            Some(ControlMode::Gamepad)
        );
        assert_eq!(DeviceEvent::FocusLost.origin(), None);
    }

    #[test]
    fn event_roundtrip_keeps_identity() {
        let event = Event::new(
            "teleop-middleware::rosbridge",
            EventPayload::SafetyStop {
                reason: StopReason::DeviceDisconnected(ControlMode::Gamepad),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.source, event.source);
    }

    #[test]
    fn error_display() {
        let err = TeleopError::InvalidTopic("bad".to_string());
        assert!(err.to_string().contains("'bad'"));
        assert!(StopReason::DeviceTimeout(ControlMode::Gamepad)
            .to_string()
            .contains("gamepad"));
    }
}
