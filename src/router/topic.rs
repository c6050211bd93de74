//! Topic patterns and the topic family synthesized for each device event

use std::fmt;
use std::str::FromStr;

use super::RouterError;
use crate::config::defaults::UNKNOWN_STATUS_ACTION;
use crate::types::DeviceEvent;

/// Wildcard segment in written patterns.
pub const WILDCARD: &str = "+";

/// Segment separator in written patterns and displayed topics.
pub const SEPARATOR: char = '_';

/// Last segment of the catch-all status topic (`+_DeviceStatus`).
pub const DEVICE_STATUS: &str = "DeviceStatus";

/// Last segment of the catch-all command topic (`+_DeviceCommand`).
pub const DEVICE_COMMAND: &str = "DeviceCommand";

// ============================================================================
// Topic
// ============================================================================

/// A concrete topic an event is emitted on.
///
/// Kept as a segment list so that ids containing `_` stay a single segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    segments: Vec<String>,
}

impl Topic {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

// ============================================================================
// Pattern
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    /// Matches any single segment value
    Wildcard,
}

impl Segment {
    pub fn literal(value: impl Into<String>) -> Self {
        Segment::Literal(value.into())
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Segment::Wildcard => true,
            Segment::Literal(lit) => lit == value,
        }
    }
}

/// A subscription pattern: literal and wildcard segments matched positionally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPattern {
    segments: Vec<Segment>,
}

impl TopicPattern {
    /// Parse a `_`-separated pattern such as `ABC_+`, `vehicle_probe` or `+`.
    pub fn parse(pattern: &str) -> Result<Self, RouterError> {
        let invalid = |reason| RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };
        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }
        let segments = pattern
            .split(SEPARATOR)
            .map(|s| match s {
                "" => Err(invalid("empty segment")),
                WILDCARD => Ok(Segment::Wildcard),
                lit => Ok(Segment::literal(lit)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    /// Build a pattern from segments directly, for literals that contain `_`.
    pub fn from_segments(segments: Vec<Segment>) -> Result<Self, RouterError> {
        if segments.is_empty() {
            return Err(RouterError::InvalidPattern {
                pattern: String::new(),
                reason: "pattern is empty",
            });
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Equal segment count, every segment matching.
    pub fn matches(&self, topic: &Topic) -> bool {
        self.segments.len() == topic.segments.len()
            && self
                .segments
                .iter()
                .zip(&topic.segments)
                .all(|(pattern, value)| pattern.matches(value))
    }
}

impl FromStr for TopicPattern {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            match segment {
                Segment::Wildcard => f.write_str(WILDCARD)?,
                Segment::Literal(lit) => f.write_str(lit)?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Topic Family
// ============================================================================

/// Topics an event is emitted on, most specific first.
///
/// | category  | device id     | device type     | event name | catch-all         |
/// |-----------|---------------|-----------------|------------|-------------------|
/// | telemetry | `{id}_{evt}`  | `{type}_{evt}`  | `+_{evt}`  | `+`               |
/// | status    | `{id}_{act}`  | `{type}_{act}`  | `+_{act}`  | `+_DeviceStatus`  |
/// | command   | `{id}_{cmd}`  | `{type}_{cmd}`  | `+_{cmd}`  | `+_DeviceCommand` |
pub fn topic_family(event: &DeviceEvent) -> Vec<Topic> {
    let (name, catch_all) = match event {
        DeviceEvent::Telemetry(e) => (e.event_type.as_str(), Topic::new([WILDCARD])),
        DeviceEvent::Status(e) => (
            e.payload
                .get("Action")
                .and_then(|a| a.as_str())
                .unwrap_or(UNKNOWN_STATUS_ACTION),
            Topic::new([WILDCARD, DEVICE_STATUS]),
        ),
        DeviceEvent::Command(e) => (e.command_type.as_str(), Topic::new([WILDCARD, DEVICE_COMMAND])),
    };

    vec![
        Topic::new([event.device_id(), name]),
        Topic::new([event.device_type(), name]),
        Topic::new([WILDCARD, name]),
        catch_all,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Payload, StatusEvent, TelemetryEvent};
    use serde_json::json;

    fn telemetry(device_id: &str, event_type: &str) -> DeviceEvent {
        DeviceEvent::Telemetry(TelemetryEvent {
            payload: Payload::Json(json!({})),
            device_type: "vehicle".to_string(),
            device_id: device_id.to_string(),
            event_type: event_type.to_string(),
            format: "json".to_string(),
        })
    }

    #[test]
    fn test_parse_pattern_segments() {
        let pattern = TopicPattern::parse("ABC_+").unwrap();
        assert_eq!(
            pattern.segments(),
            &[Segment::literal("ABC"), Segment::Wildcard]
        );
        assert_eq!(pattern.to_string(), "ABC_+");
        assert_eq!(TopicPattern::parse("+").unwrap().segments(), &[Segment::Wildcard]);
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(TopicPattern::parse("").is_err());
        assert!(TopicPattern::parse("a__b").is_err());
        assert!(TopicPattern::parse("_probe").is_err());
        assert!(TopicPattern::from_segments(Vec::new()).is_err());
    }

    #[test]
    fn test_matching_is_positional() {
        let pattern: TopicPattern = "vehicle_+".parse().unwrap();
        assert!(pattern.matches(&Topic::new(["vehicle", "probe"])));
        assert!(!pattern.matches(&Topic::new(["ABC", "probe"])));
        assert!(!pattern.matches(&Topic::new(["vehicle"])));
        assert!(!pattern.matches(&Topic::new(["vehicle", "probe", "x"])));

        // A literal never matches the wildcard segment of an emitted topic
        let literal: TopicPattern = "ABC_probe".parse().unwrap();
        assert!(!literal.matches(&Topic::new(["+", "probe"])));
    }

    #[test]
    fn test_telemetry_family_order() {
        let topics: Vec<String> = topic_family(&telemetry("ABC", "X"))
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(topics, vec!["ABC_X", "vehicle_X", "+_X", "+"]);
    }

    #[test]
    fn test_device_id_with_separator_stays_one_segment() {
        let family = topic_family(&telemetry("ABC_1", "X"));
        assert_eq!(family[0].segments(), &["ABC_1".to_string(), "X".to_string()]);

        // Split-string pattern does not reach it, an explicit literal does
        let split: TopicPattern = "ABC_+".parse().unwrap();
        assert!(!family.iter().any(|t| split.matches(t)));
        let exact =
            TopicPattern::from_segments(vec![Segment::literal("ABC_1"), Segment::Wildcard]).unwrap();
        assert!(exact.matches(&family[0]));
    }

    #[test]
    fn test_status_family_uses_action() {
        let status = DeviceEvent::Status(StatusEvent {
            device_type: "vehicle".to_string(),
            device_id: "d1".to_string(),
            payload: json!({"Action": "Disconnect"}),
            raw_topic: String::new(),
        });
        let topics: Vec<String> = topic_family(&status).iter().map(ToString::to_string).collect();
        assert_eq!(
            topics,
            vec!["d1_Disconnect", "vehicle_Disconnect", "+_Disconnect", "+_DeviceStatus"]
        );

        let unknown = DeviceEvent::Status(StatusEvent {
            device_type: "vehicle".to_string(),
            device_id: "d1".to_string(),
            payload: json!({}),
            raw_topic: String::new(),
        });
        assert_eq!(topic_family(&unknown)[0].to_string(), "d1_Unknown");
    }
}
