//! Configuration vault – reads/writes `~/.teleop/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use teleop_middleware::RosbridgeOptions;
use teleop_types::{ControlMode, Settings, TeleopError};

/// Persisted operator configuration.  Every field has a default, so a
/// partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// rosbridge WebSocket endpoint.
    #[serde(default = "default_rosbridge_url")]
    pub rosbridge_url: String,

    /// Destination topic for command messages.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Publish rate in Hz; `0` disables periodic publishing.
    #[serde(default = "default_frequency")]
    pub frequency: f64,

    #[serde(default = "default_dead_zone")]
    pub gamepad_dead_zone: f64,

    #[serde(default)]
    pub control_mode: ControlMode,

    /// `header.frame_id` of outgoing commands.
    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    #[serde(default = "default_status_topic")]
    pub status_topic: String,

    #[serde(default = "default_command_type")]
    pub command_type: String,

    #[serde(default = "default_status_type")]
    pub status_type: String,

    #[serde(default = "default_ramp_period_ms")]
    pub ramp_period_ms: u64,

    #[serde(default = "default_gamepad_poll_ms")]
    pub gamepad_poll_ms: u64,

    /// Gamepad silence after which the vehicle is stopped.
    #[serde(default = "default_device_timeout_ms")]
    pub device_timeout_ms: u64,
}

fn default_rosbridge_url() -> String {
    "ws://localhost:9090".to_string()
}
fn default_topic() -> String {
    Settings::default().topic
}
fn default_frequency() -> f64 {
    Settings::default().frequency
}
fn default_dead_zone() -> f64 {
    Settings::default().gamepad_dead_zone
}
fn default_frame_id() -> String {
    "base_link".to_string()
}
fn default_status_topic() -> String {
    RosbridgeOptions::default().status_topic
}
fn default_command_type() -> String {
    RosbridgeOptions::default().command_type
}
fn default_status_type() -> String {
    RosbridgeOptions::default().status_type
}
fn default_ramp_period_ms() -> u64 {
    1
}
fn default_gamepad_poll_ms() -> u64 {
    10
}
fn default_device_timeout_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rosbridge_url: default_rosbridge_url(),
            topic: default_topic(),
            frequency: default_frequency(),
            gamepad_dead_zone: default_dead_zone(),
            control_mode: ControlMode::default(),
            frame_id: default_frame_id(),
            status_topic: default_status_topic(),
            command_type: default_command_type(),
            status_type: default_status_type(),
            ramp_period_ms: default_ramp_period_ms(),
            gamepad_poll_ms: default_gamepad_poll_ms(),
            device_timeout_ms: default_device_timeout_ms(),
        }
    }
}

impl Config {
    /// The live-editable subset handed to the control loop.
    pub fn settings(&self) -> Settings {
        Settings {
            topic: self.topic.clone(),
            frequency: self.frequency,
            gamepad_dead_zone: self.gamepad_dead_zone,
            control_mode: self.control_mode,
        }
    }

    pub fn rosbridge_options(&self) -> RosbridgeOptions {
        RosbridgeOptions {
            command_type: self.command_type.clone(),
            status_topic: self.status_topic.clone(),
            status_type: self.status_type.clone(),
        }
    }

    /// Never zero; a zero period would spin the loop.
    pub fn ramp_period(&self) -> Duration {
        Duration::from_millis(self.ramp_period_ms.max(1))
    }

    pub fn gamepad_poll_period(&self) -> Duration {
        Duration::from_millis(self.gamepad_poll_ms.max(1))
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }
}

/// Return the path to `~/.teleop/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".teleop").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, TeleopError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, TeleopError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| TeleopError::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| TeleopError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `TELEOP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TELEOP_ROSBRIDGE_URL` | `rosbridge_url` |
/// | `TELEOP_TOPIC` | `topic` |
/// | `TELEOP_FREQUENCY` | `frequency` |
/// | `TELEOP_CONTROL_MODE` | `control_mode` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TELEOP_ROSBRIDGE_URL") {
        cfg.rosbridge_url = v;
    }
    if let Ok(v) = std::env::var("TELEOP_TOPIC") {
        cfg.topic = v;
    }
    if let Ok(v) = std::env::var("TELEOP_FREQUENCY")
        && let Ok(hz) = v.trim().parse::<f64>()
    {
        cfg.frequency = hz;
    }
    if let Ok(v) = std::env::var("TELEOP_CONTROL_MODE")
        && let Ok(mode) = v.parse::<ControlMode>()
    {
        cfg.control_mode = mode;
    }
}

/// Save the config to disk, creating `~/.teleop/` if necessary.
pub fn save(cfg: &Config) -> Result<(), TeleopError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), TeleopError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| TeleopError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                TeleopError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| TeleopError::Config(format!("failed to serialize config: {e}")))?;
    let write_err = |e: std::io::Error| TeleopError::Config(format!("failed to write {}: {e}", path.display()));
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.rosbridge_url, "ws://localhost:9090");
        assert_eq!(cfg.topic, "/vehicle/control");
        assert_eq!(cfg.frequency, 60.0);
        assert_eq!(cfg.gamepad_dead_zone, 0.1);
        assert_eq!(cfg.control_mode, ControlMode::Keyboard);
        assert_eq!(cfg.ramp_period(), Duration::from_millis(1));
        assert_eq!(cfg.gamepad_poll_period(), Duration::from_millis(10));
        assert_eq!(cfg.device_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: Config = toml::from_str("topic = \"/car/cmd\"\ncontrol_mode = \"gamepad\"\n").unwrap();
        assert_eq!(cfg.topic, "/car/cmd");
        assert_eq!(cfg.control_mode, ControlMode::Gamepad);
        assert_eq!(cfg.frequency, 60.0);
        assert_eq!(cfg.status_topic, "/vehicle/status");
    }

    #[test]
    fn settings_projection() {
        let cfg = Config {
            topic: "/x".into(),
            frequency: 20.0,
            gamepad_dead_zone: 0.3,
            control_mode: ControlMode::Joystick,
            ..Config::default()
        };
        let s = cfg.settings();
        assert_eq!(s.topic, "/x");
        assert_eq!(s.frequency, 20.0);
        assert_eq!(s.gamepad_dead_zone, 0.3);
        assert_eq!(s.control_mode, ControlMode::Joystick);
    }

    #[test]
    fn zero_periods_are_floored() {
        let cfg = Config {
            ramp_period_ms: 0,
            gamepad_poll_ms: 0,
            ..Config::default()
        };
        assert_eq!(cfg.ramp_period(), Duration::from_millis(1));
        assert_eq!(cfg.gamepad_poll_period(), Duration::from_millis(1));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap()).expect("dir metadata").permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config {
            rosbridge_url: "ws://car.local:9090".into(),
            device_timeout_ms: 250,
            ..Config::default()
        };
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.rosbridge_url, "ws://car.local:9090");
        assert_eq!(loaded.device_timeout_ms, 250);
        assert_eq!(loaded.frame_id, "base_link");
    }

    #[test]
    fn config_path_points_to_teleop_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".teleop"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "frequency = \"fast\"").unwrap();
        assert!(matches!(load_from(&path), Err(TeleopError::Config(_))));
    }

    // Each override test touches a different variable so they can run in
    // parallel.

    #[test]
    fn apply_env_overrides_changes_rosbridge_url() {
        // SAFETY: only this test touches TELEOP_ROSBRIDGE_URL.
        unsafe { std::env::set_var("TELEOP_ROSBRIDGE_URL", "ws://robot:9090") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.rosbridge_url, "ws://robot:9090");
        unsafe { std::env::remove_var("TELEOP_ROSBRIDGE_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_topic() {
        // SAFETY: only this test touches TELEOP_TOPIC.
        unsafe { std::env::set_var("TELEOP_TOPIC", "/car/cmd") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.topic, "/car/cmd");
        unsafe { std::env::remove_var("TELEOP_TOPIC") };
    }

    #[test]
    fn apply_env_overrides_frequency_parse_and_reject() {
        // SAFETY: only this test touches TELEOP_FREQUENCY.
        unsafe { std::env::set_var("TELEOP_FREQUENCY", "30") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.frequency, 30.0);

        unsafe { std::env::set_var("TELEOP_FREQUENCY", "often") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.frequency, 30.0);
        unsafe { std::env::remove_var("TELEOP_FREQUENCY") };
    }

    #[test]
    fn apply_env_overrides_control_mode_parse_and_reject() {
        // SAFETY: only this test touches TELEOP_CONTROL_MODE.
        unsafe { std::env::set_var("TELEOP_CONTROL_MODE", "Gamepad") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.control_mode, ControlMode::Gamepad);

        unsafe { std::env::set_var("TELEOP_CONTROL_MODE", "wheel") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.control_mode, ControlMode::Gamepad);
        unsafe { std::env::remove_var("TELEOP_CONTROL_MODE") };
    }
}
