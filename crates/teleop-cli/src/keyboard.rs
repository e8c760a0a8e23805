//! Terminal keyboard source.
//!
//! Puts the terminal into raw mode and turns crossterm key events into
//! [`DeviceEvent::Key`]s on a dedicated thread.
//!
//! | Keys | Meaning |
//! |---|---|
//! | `↑` / `w` | forward |
//! | `↓` / `s` | reverse |
//! | `←` / `a` | steer left |
//! | `→` / `d` | steer right |
//! | `0` / `Space` | mode OFF |
//! | `1` | mode REMOTE |
//! | `2` | mode AUTO |
//! | `r` | reload the config file |
//! | `q` / `Esc` / `Ctrl-C` | quit |
//!
//! Terminals that support the kitty keyboard protocol report key releases.
//! On the others a held direction key is released once its auto-repeat
//! stops for [`SYNTHETIC_RELEASE_AFTER`].

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossterm::event::{
    self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode};
use teleop_types::{DeviceEvent, Key, TeleopError};
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, info, warn};

const POLL_PERIOD: Duration = Duration::from_millis(20);

/// Auto-repeat gap after which a held key counts as released when the
/// terminal cannot report releases.  Longer than the usual initial repeat
/// delay.
pub const SYNTHETIC_RELEASE_AFTER: Duration = Duration::from_millis(600);

/// What a key means to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Device(Key),
    Reload,
    Quit,
}

pub fn map_key(code: KeyCode, modifiers: KeyModifiers) -> Option<KeyAction> {
    if modifiers.contains(KeyModifiers::CONTROL) {
        return match code {
            KeyCode::Char('c') | KeyCode::Char('C') => Some(KeyAction::Quit),
            _ => None,
        };
    }
    let key = match code {
        KeyCode::Up | KeyCode::Char('w') | KeyCode::Char('W') => Key::Up,
        KeyCode::Down | KeyCode::Char('s') | KeyCode::Char('S') => Key::Down,
        KeyCode::Left | KeyCode::Char('a') | KeyCode::Char('A') => Key::Left,
        KeyCode::Right | KeyCode::Char('d') | KeyCode::Char('D') => Key::Right,
        KeyCode::Char('0') | KeyCode::Char(' ') => Key::ModeOff,
        KeyCode::Char('1') => Key::ModeRemote,
        KeyCode::Char('2') => Key::ModeAuto,
        KeyCode::Char('r') | KeyCode::Char('R') => return Some(KeyAction::Reload),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return Some(KeyAction::Quit),
        _ => return None,
    };
    Some(KeyAction::Device(key))
}

fn is_direction(key: Key) -> bool {
    matches!(key, Key::Up | Key::Down | Key::Left | Key::Right)
}

/// Translate one crossterm key event.  Repeats of mode keys are dropped so
/// holding `1` does not re-request REMOTE on every repeat.
pub fn translate(event: &KeyEvent) -> Option<(KeyAction, bool)> {
    let action = map_key(event.code, event.modifiers)?;
    let pressed = match event.kind {
        KeyEventKind::Press => true,
        KeyEventKind::Repeat => match action {
            KeyAction::Device(key) if is_direction(key) => true,
            _ => return None,
        },
        KeyEventKind::Release => false,
    };
    Some((action, pressed))
}

/// Synthesises releases for terminals that only report presses.
#[derive(Debug)]
pub struct HoldTracker {
    timeout: Duration,
    held: HashMap<Key, Instant>,
}

impl HoldTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            held: HashMap::new(),
        }
    }

    /// Record a press or repeat of a direction key.
    pub fn press(&mut self, key: Key, now: Instant) {
        if is_direction(key) {
            self.held.insert(key, now);
        }
    }

    /// Keys whose repeats stopped at least `timeout` ago; they are forgotten.
    pub fn expired(&mut self, now: Instant) -> Vec<Key> {
        let timeout = self.timeout;
        let mut released: Vec<Key> = self
            .held
            .iter()
            .filter(|(_, last)| now.saturating_duration_since(**last) >= timeout)
            .map(|(key, _)| *key)
            .collect();
        released.sort_by_key(|key| *key as u8);
        for key in &released {
            self.held.remove(key);
        }
        released
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Terminal
// ────────────────────────────────────────────────────────────────────────────

/// Raw mode plus focus and (when available) release reporting; restored on
/// drop.
struct RawTerminal {
    enhanced: bool,
}

impl RawTerminal {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut out = io::stdout();
        let enhanced = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if enhanced {
            execute!(
                out,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        }
        execute!(out, EnableFocusChange)?;
        Ok(Self { enhanced })
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        let mut out = io::stdout();
        if self.enhanced {
            let _ = execute!(out, PopKeyboardEnhancementFlags);
        }
        let _ = execute!(out, DisableFocusChange);
        let _ = disable_raw_mode();
        let _ = out.flush();
    }
}

/// Where the reader thread delivers what it reads.
pub struct KeyboardSinks {
    pub devices: mpsc::Sender<DeviceEvent>,
    pub shutdown: Arc<watch::Sender<bool>>,
    pub reload: Arc<Notify>,
}

/// Owns the reader thread; the terminal is restored when it is dropped.
pub struct TerminalKeyboard {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl TerminalKeyboard {
    /// # Errors
    ///
    /// [`TeleopError::DeviceUnavailable`] when the reader thread cannot be
    /// spawned.  A terminal that refuses raw mode is logged by the thread,
    /// which then exits.
    pub fn spawn(sinks: KeyboardSinks) -> Result<Self, TeleopError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let join = thread::Builder::new()
            .name("keyboard-reader".into())
            .spawn(move || {
                if let Err(e) = read_keys(&sinks, &stop_flag) {
                    warn!(error = %e, "keyboard input unavailable");
                }
            })
            .map_err(|e| TeleopError::DeviceUnavailable(format!("keyboard reader thread: {e}")))?;

        Ok(Self {
            stop,
            join: Some(join),
        })
    }
}

impl Drop for TerminalKeyboard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            warn!("keyboard reader thread panicked");
        }
    }
}

fn read_keys(sinks: &KeyboardSinks, stop: &AtomicBool) -> io::Result<()> {
    let raw = RawTerminal::enter()?;
    let mut tracker = (!raw.enhanced).then(|| HoldTracker::new(SYNTHETIC_RELEASE_AFTER));
    info!(release_events = raw.enhanced, "keyboard input ready");

    let send = |event: DeviceEvent| sinks.devices.blocking_send(event).is_ok();

    while !stop.load(Ordering::Relaxed) {
        if event::poll(POLL_PERIOD)? {
            let forwarded = match event::read()? {
                Event::Key(key_event) => match translate(&key_event) {
                    Some((KeyAction::Device(key), pressed)) => {
                        if pressed && let Some(tracker) = tracker.as_mut() {
                            tracker.press(key, Instant::now());
                        }
                        send(DeviceEvent::Key { key, pressed })
                    }
                    Some((KeyAction::Reload, true)) => {
                        sinks.reload.notify_one();
                        true
                    }
                    Some((KeyAction::Quit, true)) => {
                        sinks.shutdown.send_replace(true);
                        return Ok(());
                    }
                    _ => true,
                },
                Event::FocusLost => send(DeviceEvent::FocusLost),
                Event::FocusGained => send(DeviceEvent::FocusGained),
                _ => true,
            };
            if !forwarded {
                break;
            }
        }
        if let Some(tracker) = tracker.as_mut() {
            for key in tracker.expired(Instant::now()) {
                if !send(DeviceEvent::Key { key, pressed: false }) {
                    debug!("device queue closed, keyboard reader stopped");
                    return Ok(());
                }
            }
        }
    }
    debug!("keyboard reader stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key_event(code: KeyCode, kind: KeyEventKind) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn arrows_and_wasd_drive() {
        let none = KeyModifiers::NONE;
        assert_eq!(map_key(KeyCode::Up, none), Some(KeyAction::Device(Key::Up)));
        assert_eq!(map_key(KeyCode::Char('w'), none), Some(KeyAction::Device(Key::Up)));
        assert_eq!(map_key(KeyCode::Char('S'), none), Some(KeyAction::Device(Key::Down)));
        assert_eq!(map_key(KeyCode::Left, none), Some(KeyAction::Device(Key::Left)));
        assert_eq!(map_key(KeyCode::Char('d'), none), Some(KeyAction::Device(Key::Right)));
    }

    #[test]
    fn mode_shortcuts() {
        let none = KeyModifiers::NONE;
        assert_eq!(map_key(KeyCode::Char('0'), none), Some(KeyAction::Device(Key::ModeOff)));
        assert_eq!(map_key(KeyCode::Char(' '), none), Some(KeyAction::Device(Key::ModeOff)));
        assert_eq!(map_key(KeyCode::Char('1'), none), Some(KeyAction::Device(Key::ModeRemote)));
        assert_eq!(map_key(KeyCode::Char('2'), none), Some(KeyAction::Device(Key::ModeAuto)));
        assert_eq!(map_key(KeyCode::Char('3'), none), None);
    }

    #[test]
    fn console_keys() {
        assert_eq!(map_key(KeyCode::Esc, KeyModifiers::NONE), Some(KeyAction::Quit));
        assert_eq!(map_key(KeyCode::Char('q'), KeyModifiers::NONE), Some(KeyAction::Quit));
        assert_eq!(map_key(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(KeyAction::Quit));
        assert_eq!(map_key(KeyCode::Char('w'), KeyModifiers::CONTROL), None);
        assert_eq!(map_key(KeyCode::Char('r'), KeyModifiers::NONE), Some(KeyAction::Reload));
    }

    #[test]
    fn press_repeat_release() {
        let up = |kind| translate(&key_event(KeyCode::Up, kind));
        assert_eq!(up(KeyEventKind::Press), Some((KeyAction::Device(Key::Up), true)));
        assert_eq!(up(KeyEventKind::Repeat), Some((KeyAction::Device(Key::Up), true)));
        assert_eq!(up(KeyEventKind::Release), Some((KeyAction::Device(Key::Up), false)));
    }

    #[test]
    fn mode_key_repeats_are_dropped() {
        assert_eq!(translate(&key_event(KeyCode::Char('1'), KeyEventKind::Repeat)), None);
        assert_eq!(
            translate(&key_event(KeyCode::Char('1'), KeyEventKind::Press)),
            Some((KeyAction::Device(Key::ModeRemote), true))
        );
    }

    #[test]
    fn hold_tracker_releases_after_repeats_stop() {
        let start = Instant::now();
        let mut tracker = HoldTracker::new(Duration::from_millis(100));
        tracker.press(Key::Up, start);
        tracker.press(Key::ModeAuto, start);

        assert!(tracker.expired(start + Duration::from_millis(50)).is_empty());
        // A repeat keeps it held.
        tracker.press(Key::Up, start + Duration::from_millis(80));
        assert!(tracker.expired(start + Duration::from_millis(150)).is_empty());

        assert_eq!(tracker.expired(start + Duration::from_millis(180)), vec![Key::Up]);
        // Released once only; mode keys are never tracked.
        assert!(tracker.expired(start + Duration::from_secs(5)).is_empty());
    }
}
