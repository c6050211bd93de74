//! Inbound message decoding

use serde_json::Value;

use super::RouterError;
use crate::types::{
    CommandEvent, DeviceEvent, InboundMessage, Payload, StatusEvent, TelemetryEvent, FORMAT_JSON,
};

/// Data envelope field unwrapped from structured payloads.
pub const ENVELOPE_FIELD: &str = "d";

/// Decode a body according to its format tag.
///
/// JSON bodies are parsed and a top-level `d` envelope is unwrapped; any other
/// format passes the raw body through unchanged.
pub fn decode_payload(
    category: &'static str,
    device_id: &str,
    format: &str,
    raw: &str,
) -> Result<Payload, RouterError> {
    if !format.eq_ignore_ascii_case(FORMAT_JSON) {
        return Ok(Payload::Raw(raw.to_string()));
    }
    let value = parse_json(category, device_id, raw)?;
    Ok(Payload::Json(unwrap_envelope(value)))
}

fn parse_json(category: &'static str, device_id: &str, raw: &str) -> Result<Value, RouterError> {
    serde_json::from_str(raw).map_err(|source| RouterError::Decode {
        category,
        device_id: device_id.to_string(),
        source,
    })
}

fn unwrap_envelope(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        if let Some(inner) = map.remove(ENVELOPE_FIELD) {
            return inner;
        }
    }
    value
}

/// Turn a wire message into the event handed to router subscribers.
pub fn decode_message(message: InboundMessage) -> Result<DeviceEvent, RouterError> {
    match message {
        InboundMessage::Status {
            device_type,
            device_id,
            payload,
            topic,
        } => {
            // Status bodies are always JSON and carry no envelope
            let payload = parse_json("status", &device_id, &payload)?;
            Ok(DeviceEvent::Status(StatusEvent {
                device_type,
                device_id,
                payload,
                raw_topic: topic,
            }))
        }
        InboundMessage::Event {
            device_type,
            device_id,
            event_type,
            format,
            payload,
        } => {
            let payload = decode_payload("telemetry", &device_id, &format, &payload)?;
            Ok(DeviceEvent::Telemetry(TelemetryEvent {
                payload,
                device_type,
                device_id,
                event_type,
                format,
            }))
        }
        InboundMessage::Command {
            device_type,
            device_id,
            command,
            format,
            payload,
        } => {
            let payload = decode_payload("command", &device_id, &format, &payload)?;
            Ok(DeviceEvent::Command(CommandEvent {
                payload,
                device_type,
                device_id,
                command_type: command,
                format,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_envelope_is_unwrapped() {
        let payload = decode_payload("telemetry", "d1", "json", r#"{"d":{"lat":1.5}}"#).unwrap();
        assert_eq!(payload, Payload::Json(json!({"lat": 1.5})));
    }

    #[test]
    fn test_json_without_envelope_is_used_as_is() {
        let payload = decode_payload("telemetry", "d1", "JSON", r#"{"lat":1.5}"#).unwrap();
        assert_eq!(payload, Payload::Json(json!({"lat": 1.5})));
    }

    #[test]
    fn test_other_formats_pass_through() {
        let payload = decode_payload("telemetry", "d1", "csv", "1.5,2.5").unwrap();
        assert_eq!(payload, Payload::Raw("1.5,2.5".to_string()));
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let err = decode_payload("telemetry", "d1", "json", "{not json").unwrap_err();
        assert!(matches!(err, RouterError::Decode { category: "telemetry", .. }));
        assert!(err.to_string().contains("d1"));
    }

    #[test]
    fn test_decode_command_keeps_command_name() {
        let event = decode_message(InboundMessage::Command {
            device_type: "vehicle".to_string(),
            device_id: "d1".to_string(),
            command: "reboot".to_string(),
            format: "json".to_string(),
            payload: r#"{"d":{"delay":5}}"#.to_string(),
        })
        .unwrap();
        match event {
            DeviceEvent::Command(cmd) => {
                assert_eq!(cmd.command_type, "reboot");
                assert_eq!(cmd.payload, Payload::Json(json!({"delay": 5})));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
