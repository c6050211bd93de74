//! Pipeline counters and statistics
//!
//! Counters are shared between the router handler (runs on the dispatch
//! path) and the pipeline worker, so they are atomics rather than fields
//! behind a lock.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated from several tasks.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    messages_received: AtomicU64,
    decode_errors: AtomicU64,
    events_dropped: AtomicU64,
    probes_processed: AtomicU64,
    probes_skipped: AtomicU64,
    lookup_failures: AtomicU64,
    alerts_fired: AtomicU64,
    alerts_closed: AtomicU64,
    rule_failures: AtomicU64,
    store_errors: AtomicU64,
}

macro_rules! counter {
    ($($inc:ident => $field:ident),* $(,)?) => {
        impl PipelineCounters {
            $(
                pub fn $inc(&self, n: u64) {
                    self.$field.fetch_add(n, Ordering::Relaxed);
                }
            )*
        }
    };
}

counter! {
    add_messages_received => messages_received,
    add_decode_errors => decode_errors,
    add_events_dropped => events_dropped,
    add_probes_processed => probes_processed,
    add_probes_skipped => probes_skipped,
    add_lookup_failures => lookup_failures,
    add_alerts_fired => alerts_fired,
    add_alerts_closed => alerts_closed,
    add_rule_failures => rule_failures,
    add_store_errors => store_errors,
}

impl PipelineCounters {
    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            probes_processed: self.probes_processed.load(Ordering::Relaxed),
            probes_skipped: self.probes_skipped.load(Ordering::Relaxed),
            lookup_failures: self.lookup_failures.load(Ordering::Relaxed),
            alerts_fired: self.alerts_fired.load(Ordering::Relaxed),
            alerts_closed: self.alerts_closed.load(Ordering::Relaxed),
            rule_failures: self.rule_failures.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Inbound messages read from the source
    pub messages_received: u64,
    /// Messages the router could not decode
    pub decode_errors: u64,
    /// Telemetry events dropped because the worker channel was full
    pub events_dropped: u64,
    pub probes_processed: u64,
    /// Telemetry that failed validation (not an error)
    pub probes_skipped: u64,
    pub lookup_failures: u64,
    pub alerts_fired: u64,
    pub alerts_closed: u64,
    pub rule_failures: u64,
    pub store_errors: u64,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline: {} messages, {} probes ({} skipped, {} lookup failures), {} alerts fired, {} closed",
            self.messages_received,
            self.probes_processed,
            self.probes_skipped,
            self.lookup_failures,
            self.alerts_fired,
            self.alerts_closed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let counters = PipelineCounters::default();
        counters.add_messages_received(3);
        counters.add_alerts_fired(1);
        counters.add_alerts_fired(2);

        let stats = counters.snapshot();
        assert_eq!(stats.messages_received, 3);
        assert_eq!(stats.alerts_fired, 3);
        assert_eq!(stats.events_dropped, 0);
        assert!(stats.to_string().contains("3 messages"));
    }
}
