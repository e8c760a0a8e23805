//! `teleop-middleware` – moves data between the control loop and the outside
//! world without caring about its meaning.
//!
//! # Modules
//!
//! - [`bus`] – topic-partitioned publish/subscribe event bus on Tokio
//!   broadcast channels.
//! - [`transport`] – the [`CommandTransport`] seam the publish scheduler
//!   writes through, plus the in-process [`BusTransport`].
//! - [`rosbridge`] – rosbridge v2 JSON frames and the WebSocket
//!   [`RosbridgeClient`] that carries commands out and telemetry in.

pub mod bus;
pub mod rosbridge;
pub mod transport;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use rosbridge::{RosbridgeClient, RosbridgeOptions};
pub use transport::{BusTransport, CommandTransport};
