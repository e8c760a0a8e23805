//! [`PublishScheduler`] – fixed-rate command publication.
//!
//! The scheduler owns the single outgoing [`ControlCommand`] and rewrites it
//! in place before every send.  A periodic tick is skipped when:
//!
//! 1. the frequency is not a positive finite number (the scheduler is inert),
//! 2. the topic is invalid (empty or not starting with `/`),
//! 3. the requested mode is OFF.
//!
//! [`PublishScheduler::publish_immediate`] is the out-of-band OFF path: it
//! ignores frequency and mode but still refuses an invalid topic.

use std::time::Duration;

use teleop_kernel::ClockOffsetEstimator;
use teleop_middleware::CommandTransport;
use teleop_types::{Command, ControlCommand, Mode, Stamp, TeleopError};
use tracing::{debug, info, warn};

/// What a publish attempt did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Published,
    /// Frequency is zero, negative or not finite.
    Inactive,
    InvalidTopic,
    /// Periodic tick while OFF.
    Off,
    TransportFailed(TeleopError),
}

/// Reject empty topics and topics without a leading `/`.
pub fn validate_topic(topic: &str) -> Result<(), TeleopError> {
    if topic.starts_with('/') {
        Ok(())
    } else {
        Err(TeleopError::InvalidTopic(topic.to_string()))
    }
}

pub struct PublishScheduler {
    topic: String,
    frequency: f64,
    advertised: Option<String>,
    pending: ControlCommand,
}

impl PublishScheduler {
    /// Nothing is advertised until [`PublishScheduler::advertise`] runs.
    pub fn new(frame_id: impl Into<String>, topic: impl Into<String>, frequency: f64) -> Self {
        Self {
            topic: topic.into(),
            frequency,
            advertised: None,
            pending: ControlCommand::new(frame_id),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// The topic currently advertised on the transport, if any.
    pub fn advertised(&self) -> Option<&str> {
        self.advertised.as_deref()
    }

    /// The message as last written.
    pub fn pending(&self) -> &ControlCommand {
        &self.pending
    }

    /// Tick period, or `None` when periodic publishing is disabled.
    pub fn period(&self) -> Option<Duration> {
        if self.frequency.is_finite() && self.frequency > 0.0 {
            Some(Duration::from_secs_f64(1.0 / self.frequency))
        } else {
            None
        }
    }

    /// Returns `true` when the value changed and the timer must be rebuilt.
    pub fn set_frequency(&mut self, frequency: f64) -> bool {
        let changed = self.frequency != frequency
            && !(self.frequency.is_nan() && frequency.is_nan());
        if changed {
            info!(from = self.frequency, to = frequency, "publish frequency changed");
            self.frequency = frequency;
        }
        changed
    }

    /// Advertise the configured topic if it is valid and not yet advertised.
    pub fn advertise(&mut self, transport: &mut dyn CommandTransport) -> Result<(), TeleopError> {
        validate_topic(&self.topic)?;
        if self.advertised.as_deref() == Some(self.topic.as_str()) {
            return Ok(());
        }
        transport.advertise(&self.topic)?;
        self.advertised = Some(self.topic.clone());
        Ok(())
    }

    /// Switch to `topic`: withdraw the old advertisement and advertise the
    /// new topic when it is valid.
    ///
    /// # Errors
    ///
    /// [`TeleopError::InvalidTopic`] when `topic` is invalid (the old topic
    /// is still withdrawn and publishing stays disabled until a valid topic
    /// arrives), or the transport's error.
    pub fn set_topic(
        &mut self,
        topic: &str,
        transport: &mut dyn CommandTransport,
    ) -> Result<(), TeleopError> {
        if topic == self.topic && self.advertised.as_deref() == Some(topic) {
            return Ok(());
        }
        if let Some(old) = self.advertised.take() {
            if let Err(e) = transport.unadvertise(&old) {
                warn!(topic = %old, error = %e, "unadvertise failed");
            }
        }
        self.topic = topic.to_string();
        self.advertise(transport)
    }

    /// One periodic tick.
    pub fn tick(
        &mut self,
        command: Command,
        mode: Mode,
        clock: &ClockOffsetEstimator,
        transport: &mut dyn CommandTransport,
        now: Stamp,
    ) -> TickOutcome {
        if self.period().is_none() {
            return TickOutcome::Inactive;
        }
        if let Err(e) = validate_topic(&self.topic) {
            debug!(error = %e, "publish tick skipped");
            return TickOutcome::InvalidTopic;
        }
        if mode == Mode::Off {
            return TickOutcome::Off;
        }
        self.send(command, mode, clock, transport, now)
    }

    /// Publish right now, regardless of frequency and mode.
    pub fn publish_immediate(
        &mut self,
        command: Command,
        mode: Mode,
        clock: &ClockOffsetEstimator,
        transport: &mut dyn CommandTransport,
        now: Stamp,
    ) -> TickOutcome {
        if let Err(e) = validate_topic(&self.topic) {
            debug!(error = %e, "immediate publish skipped");
            return TickOutcome::InvalidTopic;
        }
        self.send(command, mode, clock, transport, now)
    }

    fn send(
        &mut self,
        command: Command,
        mode: Mode,
        clock: &ClockOffsetEstimator,
        transport: &mut dyn CommandTransport,
        now: Stamp,
    ) -> TickOutcome {
        if let Err(e) = self.advertise(transport) {
            return TickOutcome::TransportFailed(e);
        }

        self.pending.header.stamp = clock.to_vehicle_time(now);
        self.pending.mode = mode;
        self.pending.curvature_ratio = command.steering;
        self.pending.velocity_ratio = command.velocity;

        match transport.publish(&self.topic, &self.pending) {
            Ok(()) => TickOutcome::Published,
            Err(e) => TickOutcome::TransportFailed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every call so tests can inspect traffic.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        published: Vec<(String, ControlCommand)>,
        fail_publish: bool,
    }

    impl CommandTransport for Recorder {
        fn advertise(&mut self, topic: &str) -> Result<(), TeleopError> {
            self.calls.push(format!("advertise {topic}"));
            Ok(())
        }

        fn unadvertise(&mut self, topic: &str) -> Result<(), TeleopError> {
            self.calls.push(format!("unadvertise {topic}"));
            Ok(())
        }

        fn publish(&mut self, topic: &str, message: &ControlCommand) -> Result<(), TeleopError> {
            if self.fail_publish {
                return Err(TeleopError::Transport("socket gone".into()));
            }
            self.published.push((topic.to_string(), message.clone()));
            Ok(())
        }
    }

    fn moving() -> Command {
        Command { velocity: 0.4, steering: -0.2 }
    }

    #[test]
    fn topic_validation() {
        assert!(validate_topic("/vehicle/control").is_ok());
        assert!(validate_topic("").is_err());
        assert!(matches!(validate_topic("bad"), Err(TeleopError::InvalidTopic(t)) if t == "bad"));
    }

    #[test]
    fn period_follows_frequency() {
        let mut s = PublishScheduler::new("base_link", "/cmd", 50.0);
        assert_eq!(s.period(), Some(Duration::from_millis(20)));
        assert!(s.set_frequency(0.0));
        assert_eq!(s.period(), None);
        assert!(!s.set_frequency(0.0));
        s.set_frequency(f64::INFINITY);
        assert_eq!(s.period(), None);
        s.set_frequency(-5.0);
        assert_eq!(s.period(), None);
    }

    #[test]
    fn tick_writes_message_in_vehicle_time() {
        let mut transport = Recorder::default();
        let mut clock = ClockOffsetEstimator::new();
        clock.observe(Stamp::new(105, 0), Stamp::new(100, 0));

        let mut s = PublishScheduler::new("base_link", "/cmd", 60.0);
        let outcome = s.tick(moving(), Mode::Remote, &clock, &mut transport, Stamp::new(200, 10));
        assert_eq!(outcome, TickOutcome::Published);

        let (topic, msg) = &transport.published[0];
        assert_eq!(topic, "/cmd");
        assert_eq!(msg.header.frame_id, "base_link");
        assert_eq!(msg.header.stamp, Stamp::new(195, 10));
        assert_eq!(msg.mode, Mode::Remote);
        assert_eq!(msg.velocity_ratio, 0.4);
        assert_eq!(msg.curvature_ratio, -0.2);
        assert_eq!(s.pending(), msg);
        assert_eq!(transport.calls, vec!["advertise /cmd"]);
    }

    #[test]
    fn tick_gating() {
        let mut transport = Recorder::default();
        let clock = ClockOffsetEstimator::new();
        let now = Stamp::new(1, 0);

        let mut s = PublishScheduler::new("f", "/cmd", 60.0);
        assert_eq!(s.tick(moving(), Mode::Off, &clock, &mut transport, now), TickOutcome::Off);

        s.set_frequency(0.0);
        let outcome = s.tick(moving(), Mode::Remote, &clock, &mut transport, now);
        assert_eq!(outcome, TickOutcome::Inactive);

        let mut bad = PublishScheduler::new("f", "bad", 60.0);
        let outcome = bad.tick(moving(), Mode::Remote, &clock, &mut transport, now);
        assert_eq!(outcome, TickOutcome::InvalidTopic);
        assert!(transport.published.is_empty());
    }

    #[test]
    fn immediate_publish_ignores_frequency_and_mode() {
        let mut transport = Recorder::default();
        let clock = ClockOffsetEstimator::new();
        let mut s = PublishScheduler::new("f", "/cmd", 0.0);

        let now = Stamp::new(3, 0);
        let outcome = s.publish_immediate(Command::NEUTRAL, Mode::Off, &clock, &mut transport, now);
        assert_eq!(outcome, TickOutcome::Published);
        assert_eq!(transport.published.len(), 1);
        assert_eq!(transport.published[0].1.mode, Mode::Off);
    }

    #[test]
    fn immediate_publish_respects_topic_validation() {
        let mut transport = Recorder::default();
        let clock = ClockOffsetEstimator::new();
        let mut s = PublishScheduler::new("f", "bad", 60.0);
        let now = Stamp::new(3, 0);
        assert_eq!(
            s.publish_immediate(Command::NEUTRAL, Mode::Off, &clock, &mut transport, now),
            TickOutcome::InvalidTopic
        );
        assert!(transport.calls.is_empty());
    }

    #[test]
    fn topic_change_readvertises() {
        let mut transport = Recorder::default();
        let mut s = PublishScheduler::new("f", "/a", 60.0);
        s.advertise(&mut transport).unwrap();
        s.set_topic("/b", &mut transport).unwrap();
        // Same topic again is a no-op.
        s.set_topic("/b", &mut transport).unwrap();
        assert_eq!(transport.calls, vec!["advertise /a", "unadvertise /a", "advertise /b"]);
        assert_eq!(s.advertised(), Some("/b"));
    }

    #[test]
    fn invalid_topic_withdraws_old_advertisement() {
        let mut transport = Recorder::default();
        let mut s = PublishScheduler::new("f", "/a", 60.0);
        s.advertise(&mut transport).unwrap();
        assert!(s.set_topic("oops", &mut transport).is_err());
        assert_eq!(s.advertised(), None);
        assert_eq!(transport.calls, vec!["advertise /a", "unadvertise /a"]);
    }

    #[test]
    fn transport_failure_is_reported() {
        let mut transport = Recorder { fail_publish: true, ..Default::default() };
        let clock = ClockOffsetEstimator::new();
        let mut s = PublishScheduler::new("f", "/cmd", 60.0);
        assert!(matches!(
            s.tick(moving(), Mode::Auto, &clock, &mut transport, Stamp::new(1, 0)),
            TickOutcome::TransportFailed(TeleopError::Transport(_))
        ));
    }
}
