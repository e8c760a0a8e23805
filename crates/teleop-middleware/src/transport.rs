//! [`CommandTransport`] – where command messages leave the process.
//!
//! The publish scheduler only ever talks to this trait.  Calls must not
//! block: implementations queue the message and return.  A failure is
//! reported to the caller and never retried here.

use std::collections::HashSet;

use teleop_types::{ControlCommand, Event, EventPayload, TeleopError};
use tracing::{debug, info};

use crate::bus::{EventBus, Topic};

pub trait CommandTransport: Send {
    /// Announce that commands will be published on `topic`.
    fn advertise(&mut self, topic: &str) -> Result<(), TeleopError>;

    /// Withdraw a previous advertisement.
    fn unadvertise(&mut self, topic: &str) -> Result<(), TeleopError>;

    /// Queue one command message for `topic`.
    fn publish(&mut self, topic: &str, message: &ControlCommand) -> Result<(), TeleopError>;
}

/// Dry-run transport: every published message becomes a
/// [`EventPayload::CommandPublished`] event on [`Topic::Commands`].
///
/// Publishing to a topic that was not advertised is rejected, the same way
/// a rosbridge server refuses it.
pub struct BusTransport {
    bus: EventBus,
    advertised: HashSet<String>,
}

impl BusTransport {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            advertised: HashSet::new(),
        }
    }

    pub fn is_advertised(&self, topic: &str) -> bool {
        self.advertised.contains(topic)
    }
}

impl CommandTransport for BusTransport {
    fn advertise(&mut self, topic: &str) -> Result<(), TeleopError> {
        if self.advertised.insert(topic.to_string()) {
            info!(topic, "advertised (dry run)");
        }
        Ok(())
    }

    fn unadvertise(&mut self, topic: &str) -> Result<(), TeleopError> {
        if self.advertised.remove(topic) {
            info!(topic, "unadvertised (dry run)");
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, message: &ControlCommand) -> Result<(), TeleopError> {
        if !self.advertised.contains(topic) {
            return Err(TeleopError::Transport(format!("topic '{topic}' is not advertised")));
        }
        let event = Event::new(
            "teleop-middleware::bus_transport",
            EventPayload::CommandPublished {
                topic: topic.to_string(),
                message: message.clone(),
            },
        );
        if self.bus.publish_to(Topic::Commands, event).is_err() {
            debug!(topic, "command published with no bus listeners");
        }
        Ok(())
    }
}
