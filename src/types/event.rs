//! Inbound device messages: wire form and decoded categories

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire format tag for structured (JSON) payloads.
pub const FORMAT_JSON: &str = "json";

fn default_format() -> String {
    FORMAT_JSON.to_string()
}

/// A raw message as delivered by the device transport, before decoding.
///
/// Serialized as one JSON object per line by the stdin/file sources and the
/// simulation binary, e.g.
/// `{"kind":"event","device_type":"vehicle","device_id":"d1","event_type":"probe","payload":"{\"d\":{...}}"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundMessage {
    Status {
        device_type: String,
        device_id: String,
        payload: String,
        #[serde(default)]
        topic: String,
    },
    Event {
        device_type: String,
        device_id: String,
        event_type: String,
        #[serde(default = "default_format")]
        format: String,
        payload: String,
    },
    Command {
        device_type: String,
        device_id: String,
        command: String,
        #[serde(default = "default_format")]
        format: String,
        payload: String,
    },
}

impl InboundMessage {
    pub fn device_id(&self) -> &str {
        match self {
            InboundMessage::Status { device_id, .. }
            | InboundMessage::Event { device_id, .. }
            | InboundMessage::Command { device_id, .. } => device_id,
        }
    }
}

/// Decoded message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured body (after unwrapping the `d` envelope, when present)
    Json(Value),
    /// Non-JSON body passed through unchanged
    Raw(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Raw(_) => None,
        }
    }
}

/// Device status change: `(device_type, device_id, payload, raw_topic)`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub device_type: String,
    pub device_id: String,
    pub payload: Value,
    pub raw_topic: String,
}

/// Device telemetry: `(payload, device_type, device_id, event_type, format)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub payload: Payload,
    pub device_type: String,
    pub device_id: String,
    pub event_type: String,
    pub format: String,
}

/// Command seen on the bus: `(payload, device_type, device_id, command_type, format)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEvent {
    pub payload: Payload,
    pub device_type: String,
    pub device_id: String,
    pub command_type: String,
    pub format: String,
}

/// A decoded device event as delivered to router handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Status(StatusEvent),
    Telemetry(TelemetryEvent),
    Command(CommandEvent),
}

impl DeviceEvent {
    pub fn device_type(&self) -> &str {
        match self {
            DeviceEvent::Status(e) => &e.device_type,
            DeviceEvent::Telemetry(e) => &e.device_type,
            DeviceEvent::Command(e) => &e.device_type,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            DeviceEvent::Status(e) => &e.device_id,
            DeviceEvent::Telemetry(e) => &e.device_id,
            DeviceEvent::Command(e) => &e.device_id,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            DeviceEvent::Status(_) => "status",
            DeviceEvent::Telemetry(_) => "telemetry",
            DeviceEvent::Command(_) => "command",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_defaults_format_to_json() {
        let line = r#"{"kind":"event","device_type":"vehicle","device_id":"d1","event_type":"probe","payload":"{}"}"#;
        let msg: InboundMessage = serde_json::from_str(line).unwrap();
        match msg {
            InboundMessage::Event { format, .. } => assert_eq!(format, "json"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_status_topic_is_optional() {
        let line = r#"{"kind":"status","device_type":"vehicle","device_id":"d1","payload":"{\"Action\":\"Connect\"}"}"#;
        let msg: InboundMessage = serde_json::from_str(line).unwrap();
        assert_eq!(msg.device_id(), "d1");
    }
}
