//! `teleop` – terminal teleoperation console.
//!
//! This binary wires the stack together:
//!
//! 1. Loads `~/.teleop/config.toml`, writing the defaults on first run.
//! 2. Connects to rosbridge, or with `--dry-run` publishes onto the
//!    in-process bus and logs what would have been sent.
//! 3. Reads the keyboard (and, when built with `--features gilrs`, gamepads)
//!    into the control loop.
//! 4. Intercepts **Ctrl-C** / `q` so the vehicle receives a final OFF
//!    command before the process exits.

mod config;
mod keyboard;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use teleop_hal::PollerHandle;
use teleop_middleware::{BusTransport, CommandTransport, EventBus, RosbridgeClient, Topic, TopicReceiver};
use teleop_runtime::{ControlLoop, LoopInputs, Teleop, TeleopConfig, init_tracing};
use teleop_types::{ControlMode, DeviceEvent, EventPayload, Settings, TeleopError};
use tokio::sync::{Notify, broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::keyboard::{KeyboardSinks, TerminalKeyboard};

const DEVICE_QUEUE_DEPTH: usize = 256;

/// Upper bound on waiting for rosbridge to flush the final frames.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    dry_run: bool,
    help: bool,
}

fn parse_args<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    for arg in args {
        match arg.as_str() {
            "--dry-run" | "-n" => parsed.dry_run = true,
            "--help" | "-h" => parsed.help = true,
            other => return Err(format!("unknown argument '{other}'")),
        }
    }
    Ok(parsed)
}

fn main() -> ExitCode {
    // RUST_LOG filters, TELEOP_LOG_FORMAT=json switches to JSON lines and
    // OTEL_EXPORTER_OTLP_ENDPOINT enables span export.
    let _telemetry = init_tracing("teleop");

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{} {msg}", "error:".red().bold());
            print_usage();
            return ExitCode::FAILURE;
        }
    };
    if args.help {
        print_usage();
        return ExitCode::SUCCESS;
    }

    print_banner();

    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} failed to start async runtime: {e}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, args)) {
        Ok(()) => {
            println!("{}", "  ✓ Vehicle commanded OFF. Bye.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn load_config() -> Result<Config, TeleopError> {
    let path = config::config_path();
    if let Some(cfg) = config::load()? {
        println!("{} {}", "Config loaded from".dimmed(), path.display().to_string().cyan());
        return Ok(cfg);
    }

    let mut cfg = Config::default();
    match config::save(&cfg) {
        Ok(()) => println!("{} {}", "Wrote default config to".dimmed(), path.display().to_string().cyan()),
        Err(e) => warn!(error = %e, "could not write default config"),
    }
    config::apply_env_overrides(&mut cfg);
    Ok(cfg)
}

async fn run(cfg: Config, args: CliArgs) -> Result<(), TeleopError> {
    let bus = EventBus::default();
    // Subscribe before connecting so no early status frame is missed.
    let telemetry = bus.subscribe_to(Topic::Telemetry);
    tokio::spawn(report_alerts(bus.subscribe_to(Topic::SystemAlerts)));

    let mut rosbridge_closed = None;
    let transport: Box<dyn CommandTransport> = if args.dry_run {
        println!("{}", "Dry run: commands stay on the local bus.".yellow());
        tokio::spawn(log_commands(bus.subscribe_to(Topic::Commands)));
        Box::new(BusTransport::new(bus.clone()))
    } else {
        println!("{} {}", "Connecting to".dimmed(), cfg.rosbridge_url.cyan());
        let client = RosbridgeClient::connect(&cfg.rosbridge_url, cfg.rosbridge_options(), bus.clone()).await?;
        rosbridge_closed = Some(client.closed());
        Box::new(client)
    };

    // ── Shutdown ───────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let ctrlc_shutdown = Arc::clone(&shutdown_tx);
    if let Err(e) = ctrlc::set_handler(move || {
        print!("\r\n{}\r\n", "⚠  Ctrl-C received – commanding OFF …".yellow().bold());
        ctrlc_shutdown.send_replace(true);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    // ── Settings ───────────────────────────────────────────────────────────
    let (settings_tx, settings_rx) = watch::channel(cfg.settings());
    let reload = Arc::new(Notify::new());
    let reloader = tokio::spawn(reload_settings(Arc::clone(&reload), settings_tx));

    // ── Devices ────────────────────────────────────────────────────────────
    let (devices_tx, devices_rx) = mpsc::channel(DEVICE_QUEUE_DEPTH);
    let gamepad = spawn_gamepad(&cfg, devices_tx.clone())?;
    if cfg.control_mode == ControlMode::Joystick {
        warn!("the terminal has no joystick; drive with the keyboard or a gamepad");
    }
    let keyboard = TerminalKeyboard::spawn(KeyboardSinks {
        devices: devices_tx,
        shutdown: Arc::clone(&shutdown_tx),
        reload,
    })?;
    print_controls(&cfg);

    let teleop = Teleop::new(
        TeleopConfig {
            frame_id: cfg.frame_id.clone(),
            settings: cfg.settings(),
            device_timeout: cfg.device_timeout(),
        },
        transport,
        bus.clone(),
    );
    let inputs = LoopInputs {
        devices: devices_rx,
        telemetry,
        settings: settings_rx,
        shutdown: shutdown_rx,
    };
    let teleop = ControlLoop::new(teleop, inputs)
        .with_ramp_period(cfg.ramp_period())
        .run()
        .await;

    // Restore the terminal before anything else is printed.
    drop(keyboard);
    drop(gamepad);
    reloader.abort();
    info!(mode = %teleop.requested_mode(), "teleop stopped");

    // Dropping the controller drops the transport, which lets rosbridge
    // flush the final OFF frame.
    drop(teleop);
    if let Some(closed) = rosbridge_closed
        && tokio::time::timeout(FLUSH_TIMEOUT, closed).await.is_err()
    {
        warn!("rosbridge did not flush in time; the final OFF command may be lost");
    }
    Ok(())
}

#[cfg(feature = "gilrs")]
fn spawn_gamepad(cfg: &Config, tx: mpsc::Sender<DeviceEvent>) -> Result<Option<PollerHandle>, TeleopError> {
    use teleop_hal::{GamepadPoller, GilrsSource};
    GamepadPoller::<GilrsSource>::spawn(GilrsSource::new, cfg.gamepad_poll_period(), tx).map(Some)
}

#[cfg(not(feature = "gilrs"))]
fn spawn_gamepad(cfg: &Config, _tx: mpsc::Sender<DeviceEvent>) -> Result<Option<PollerHandle>, TeleopError> {
    if cfg.control_mode == ControlMode::Gamepad {
        warn!("built without gamepad support; rebuild with `--features gilrs`");
    }
    Ok(None)
}

/// Re-read the config file whenever `r` is pressed and push the live
/// settings into the control loop.
async fn reload_settings(reload: Arc<Notify>, settings: watch::Sender<Settings>) {
    loop {
        reload.notified().await;
        match config::load() {
            Ok(Some(cfg)) => {
                info!(topic = %cfg.topic, frequency = cfg.frequency, device = %cfg.control_mode, "settings reloaded");
                settings.send_replace(cfg.settings());
            }
            Ok(None) => warn!("config file missing, settings unchanged"),
            Err(e) => warn!(error = %e, "config reload failed, settings unchanged"),
        }
    }
}

async fn report_alerts(mut alerts: TopicReceiver) {
    loop {
        match alerts.recv().await {
            Ok(event) => match event.payload {
                EventPayload::SafetyStop { reason } => {
                    print!("\r{} {reason}\r\n", "■ STOP".red().bold());
                }
                EventPayload::ModeReport { requested, reported } if requested != reported => print!(
                    "\r{} requested {requested}, vehicle reports {reported}\r\n",
                    "≠ MODE".yellow().bold()
                ),
                EventPayload::ModeReport { reported, .. } => {
                    print!("\r{} vehicle in {reported}\r\n", "● MODE".green().bold());
                }
                EventPayload::TransportFault { topic, message } => {
                    print!("\r{} {topic}: {message}\r\n", "✗ LINK".red().bold());
                }
                _ => {}
            },
            Err(broadcast::error::RecvError::Lagged(n)) => debug!(skipped = n, "alerts lagged"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn log_commands(mut commands: TopicReceiver) {
    loop {
        match commands.recv().await {
            Ok(event) => {
                if let EventPayload::CommandPublished { topic, message } = event.payload {
                    debug!(
                        %topic,
                        mode = %message.mode,
                        velocity = message.velocity_ratio,
                        curvature = message.curvature_ratio,
                        "dry-run publish"
                    );
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => debug!(skipped = n, "command log lagged"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Output
// ────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", "  ┌──────────────────────────────┐".cyan());
    println!("{}", "  │   teleop · vehicle console   │".cyan().bold());
    println!("{}", "  └──────────────────────────────┘".cyan());
    println!();
}

fn print_usage() {
    println!("{}", "Usage: teleop [--dry-run] [--help]".bold());
    println!("  -n, --dry-run   publish to the local bus instead of rosbridge");
    println!("  -h, --help      show this message");
    println!();
    println!("Configuration lives in {}.", config::config_path().display());
}

fn print_controls(cfg: &Config) {
    println!(
        "{} {} at {} Hz on {}",
        "Driving".bold(),
        cfg.control_mode.to_string().cyan(),
        cfg.frequency,
        cfg.topic.cyan()
    );
    println!(
        "{}",
        "  arrows/WASD drive · 1 REMOTE · 2 AUTO · 0/space OFF · r reload · q quit".dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<CliArgs, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn no_arguments() {
        assert_eq!(args(&[]).unwrap(), CliArgs::default());
    }

    #[test]
    fn dry_run_and_help_flags() {
        let parsed = args(&["--dry-run", "-h"]).unwrap();
        assert!(parsed.dry_run);
        assert!(parsed.help);
        assert!(args(&["-n"]).unwrap().dry_run);
    }

    #[test]
    fn unknown_argument_is_rejected() {
        let err = args(&["--turbo"]).unwrap_err();
        assert!(err.contains("--turbo"));
    }
}
