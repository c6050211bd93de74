//! Event Router - wildcard publish/subscribe for inbound device events
//!
//! Subscribers register a [`TopicPattern`] and a handler. Every inbound message
//! is decoded once and emitted on its whole topic family, most specific topic
//! first, so listeners can subscribe per device, per device type, per event
//! name, or globally at the same time:
//!
//! ```text
//! {deviceId}_{event}  →  {deviceType}_{event}  →  +_{event}  →  +
//! ```
//!
//! Handlers run synchronously inside `emit`, in registration order. A handler
//! that fails or panics is logged and never stops delivery to the others.

mod decode;
mod topic;

pub use decode::{decode_message, decode_payload, ENVELOPE_FIELD};
pub use topic::{topic_family, Segment, Topic, TopicPattern, DEVICE_COMMAND, DEVICE_STATUS, WILDCARD};

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, warn};

use crate::queue::panic_message;
use crate::types::{DeviceEvent, InboundMessage};

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("invalid topic pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },
    #[error("failed to decode {category} payload from device {device_id}: {source}")]
    Decode {
        category: &'static str,
        device_id: String,
        source: serde_json::Error,
    },
}

/// Handle returned by [`EventRouter::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber callback: the topic that matched and the decoded event.
pub type Handler = Arc<dyn Fn(&Topic, &DeviceEvent) -> anyhow::Result<()> + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    pattern: TopicPattern,
    handler: Handler,
}

/// Pattern-matching dispatch table.
#[derive(Default)]
pub struct EventRouter {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a written pattern such as `ABC_+`, `vehicle_probe` or `+`.
    pub fn on<F>(&self, pattern: &str, handler: F) -> Result<SubscriptionId, RouterError>
    where
        F: Fn(&Topic, &DeviceEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Ok(self.on_pattern(TopicPattern::parse(pattern)?, handler))
    }

    /// Subscribe to a pre-built pattern.
    pub fn on_pattern<F>(&self, pattern: TopicPattern, handler: F) -> SubscriptionId
    where
        F: Fn(&Topic, &DeviceEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(pattern = %pattern, id = id.0, "Router subscription added");
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription {
                id,
                pattern,
                handler: Arc::new(handler),
            });
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Invoke every handler whose pattern matches `topic`, in registration order.
    ///
    /// Returns the number of handlers invoked. Handlers are snapshotted before
    /// the first call, so a handler may subscribe or unsubscribe without
    /// deadlocking; the change applies from the next emit.
    pub fn emit(&self, topic: &Topic, event: &DeviceEvent) -> usize {
        let matched: Vec<Handler> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.pattern.matches(topic))
            .map(|s| Arc::clone(&s.handler))
            .collect();

        for handler in &matched {
            match std::panic::catch_unwind(AssertUnwindSafe(|| handler(topic, event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(topic = %topic, device_id = event.device_id(), error = %e, "Router handler failed");
                }
                Err(panic) => {
                    error!(
                        topic = %topic,
                        device_id = event.device_id(),
                        panic = %panic_message(panic.as_ref()),
                        "Router handler panicked"
                    );
                }
            }
        }
        matched.len()
    }

    /// Decode an inbound message and emit it on its topic family.
    ///
    /// Returns the total number of handler invocations. A message that cannot
    /// be decoded reaches no handler.
    pub fn dispatch(&self, message: InboundMessage) -> Result<usize, RouterError> {
        let event = decode_message(message)?;
        Ok(self.dispatch_event(&event))
    }

    /// Emit an already-decoded event on its topic family.
    pub fn dispatch_event(&self, event: &DeviceEvent) -> usize {
        topic_family(event)
            .iter()
            .map(|topic| self.emit(topic, event))
            .sum()
    }
}
