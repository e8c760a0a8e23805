//! rosbridge v2 WebSocket client.
//!
//! Commands go out as `advertise` / `unadvertise` / `publish` frames;
//! vehicle status comes back as `publish` frames on the status topic and is
//! forwarded to [`Topic::Telemetry`] as [`EventPayload::VehicleStatus`]
//! events stamped with the local receive time.
//!
//! The socket is owned by one pump task.  [`RosbridgeClient`] only pushes
//! serialised frames into an unbounded queue, so its [`CommandTransport`]
//! calls never block the control loop.  Dropping the client closes the
//! queue; the pump still flushes what was queued (the final OFF command
//! included) before closing the socket.

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use teleop_types::{ControlCommand, Event, EventPayload, TeleopError, VehicleStatus};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Topic};
use crate::transport::CommandTransport;

const SOURCE: &str = "teleop-middleware::rosbridge";

// ────────────────────────────────────────────────────────────────────────────
// Frames
// ────────────────────────────────────────────────────────────────────────────

pub fn advertise_frame(topic: &str, msg_type: &str) -> String {
    json!({ "op": "advertise", "topic": topic, "type": msg_type }).to_string()
}

pub fn unadvertise_frame(topic: &str) -> String {
    json!({ "op": "unadvertise", "topic": topic }).to_string()
}

pub fn subscribe_frame(topic: &str, msg_type: &str) -> String {
    json!({ "op": "subscribe", "topic": topic, "type": msg_type }).to_string()
}

/// Build the `publish` frame carrying one command message.
pub fn publish_frame(topic: &str, message: &ControlCommand) -> Result<String, TeleopError> {
    let msg = serde_json::to_value(message).map_err(|e| TeleopError::Parsing(e.to_string()))?;
    Ok(json!({ "op": "publish", "topic": topic, "msg": msg }).to_string())
}

/// Extract a [`VehicleStatus`] from an inbound frame.
///
/// Returns `Ok(None)` for well-formed frames that are not a publish on
/// `status_topic`.
///
/// # Errors
///
/// [`TeleopError::Parsing`] when the text is not JSON or the status payload
/// is malformed, including a mode outside `0..=2`.
pub fn parse_status_frame(text: &str, status_topic: &str) -> Result<Option<VehicleStatus>, TeleopError> {
    let frame: Value = serde_json::from_str(text).map_err(|e| TeleopError::Parsing(e.to_string()))?;

    let op = frame.get("op").and_then(Value::as_str).unwrap_or("");
    let topic = frame.get("topic").and_then(Value::as_str).unwrap_or("");
    if op != "publish" || topic != status_topic {
        return Ok(None);
    }

    let msg = frame
        .get("msg")
        .cloned()
        .ok_or_else(|| TeleopError::Parsing("status frame has no 'msg'".into()))?;
    serde_json::from_value(msg)
        .map(Some)
        .map_err(|e| TeleopError::Parsing(format!("status frame: {e}")))
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// Message types and the status topic used on the rosbridge link.
#[derive(Debug, Clone)]
pub struct RosbridgeOptions {
    pub command_type: String,
    pub status_topic: String,
    pub status_type: String,
}

impl Default for RosbridgeOptions {
    fn default() -> Self {
        Self {
            command_type: "teleop_msgs/msg/ControlCommand".to_string(),
            status_topic: "/vehicle/status".to_string(),
            status_type: "teleop_msgs/msg/VehicleStatus".to_string(),
        }
    }
}

pub struct RosbridgeClient {
    outgoing: mpsc::UnboundedSender<String>,
    command_type: String,
    pump: JoinHandle<()>,
    // Never written; its sender is dropped when the pump exits.
    done: watch::Receiver<()>,
}

impl RosbridgeClient {
    /// Connect to `url`, subscribe to the status topic and start the pump.
    ///
    /// # Errors
    ///
    /// [`TeleopError::Transport`] when the WebSocket handshake fails.
    #[tracing::instrument(skip(bus, options), fields(status_topic = %options.status_topic))]
    pub async fn connect(url: &str, options: RosbridgeOptions, bus: EventBus) -> Result<Self, TeleopError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| TeleopError::Transport(format!("rosbridge connect to {url}: {e}")))?;
        info!(url, "connected to rosbridge");

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        outgoing
            .send(subscribe_frame(&options.status_topic, &options.status_type))
            .map_err(|_| TeleopError::Channel("rosbridge queue closed".into()))?;

        let status_topic = options.status_topic.clone();
        let (done_tx, done) = watch::channel(());
        let pump = tokio::spawn(async move {
            let _done = done_tx;
            loop {
                tokio::select! {
                    frame = outgoing_rx.recv() => {
                        let Some(frame) = frame else { break };
                        if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                            report_fault(&bus, &status_topic, format!("send failed: {e}"));
                            break;
                        }
                    }
                    msg = ws_rx.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => forward_status(&bus, text.as_str(), &status_topic),
                            Some(Ok(Message::Close(_))) | None => {
                                report_fault(&bus, &status_topic, "connection closed by server".into());
                                break;
                            }
                            Some(Err(e)) => {
                                report_fault(&bus, &status_topic, format!("receive failed: {e}"));
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                }
            }
            let _ = ws_tx.close().await;
            debug!("rosbridge pump stopped");
        });

        Ok(Self {
            outgoing,
            command_type: options.command_type,
            pump,
            done,
        })
    }

    /// `false` once the pump has stopped; further calls fail.
    pub fn is_connected(&self) -> bool {
        !self.pump.is_finished()
    }

    /// Resolves once the pump has stopped, i.e. after the client is dropped
    /// and every queued frame was written, or when the link failed.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut done = self.done.clone();
        async move {
            // Only ever fails, once the sender is gone.
            let _ = done.changed().await;
        }
    }

    fn enqueue(&self, frame: String) -> Result<(), TeleopError> {
        self.outgoing
            .send(frame)
            .map_err(|_| TeleopError::Transport("rosbridge connection closed".into()))
    }
}

impl CommandTransport for RosbridgeClient {
    fn advertise(&mut self, topic: &str) -> Result<(), TeleopError> {
        self.enqueue(advertise_frame(topic, &self.command_type))?;
        info!(topic, msg_type = %self.command_type, "advertised");
        Ok(())
    }

    fn unadvertise(&mut self, topic: &str) -> Result<(), TeleopError> {
        self.enqueue(unadvertise_frame(topic))?;
        info!(topic, "unadvertised");
        Ok(())
    }

    fn publish(&mut self, topic: &str, message: &ControlCommand) -> Result<(), TeleopError> {
        self.enqueue(publish_frame(topic, message)?)
    }
}

fn forward_status(bus: &EventBus, text: &str, status_topic: &str) {
    match parse_status_frame(text, status_topic) {
        Ok(Some(status)) => {
            // Event::new stamps the envelope now, i.e. at receive time.
            let event = Event::new(SOURCE, EventPayload::VehicleStatus(status));
            if bus.publish_to(Topic::Telemetry, event).is_err() {
                debug!("vehicle status dropped, no telemetry listeners");
            }
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "dropping malformed telemetry frame"),
    }
}

fn report_fault(bus: &EventBus, status_topic: &str, message: String) {
    warn!(%message, "rosbridge link failed");
    let event = Event::new(
        SOURCE,
        EventPayload::TransportFault {
            topic: status_topic.to_string(),
            message,
        },
    );
    let _ = bus.publish_to(Topic::SystemAlerts, event);
}
