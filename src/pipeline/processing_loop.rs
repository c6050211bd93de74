//! Message processing loop shared across all input modes.
//!
//! Reads a [`MessageSource`] and hands each message to the [`EventRouter`]
//! until the source ends or the cancellation token fires, then drains the
//! pipeline worker and reports final statistics.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::coordinator::PipelineHandle;
use super::source::{MessageSource, SourceEvent};
use super::state::PipelineStats;
use crate::router::EventRouter;

/// Progress is logged every this many messages.
const PROGRESS_INTERVAL: u64 = 1000;

/// Owns everything the ingestion loop needs.
///
/// Built with [`new()`](ProcessingLoop::new), then consumed by
/// [`run()`](ProcessingLoop::run).
///
/// By default the loop waits for room in the pipeline channel before
/// dispatching each message, so a slow worker slows ingestion down instead
/// of losing telemetry.
pub struct ProcessingLoop {
    router: Arc<EventRouter>,
    pipeline: PipelineHandle,
    cancel_token: CancellationToken,
    drop_when_full: bool,
}

impl ProcessingLoop {
    pub fn new(router: Arc<EventRouter>, pipeline: PipelineHandle, cancel_token: CancellationToken) -> Self {
        Self {
            router,
            pipeline,
            cancel_token,
            drop_when_full: false,
        }
    }

    /// Dispatch without waiting for channel room; telemetry arriving while
    /// the channel is full is dropped and counted.
    pub fn drop_when_full(mut self, enabled: bool) -> Self {
        self.drop_when_full = enabled;
        self
    }

    /// Run until the source is exhausted or cancellation.
    ///
    /// Returns final pipeline statistics, after every routed event has been
    /// processed.
    pub async fn run<S: MessageSource>(self, source: &mut S) -> PipelineStats {
        let counters = self.pipeline.counters();
        let mut messages = 0u64;

        info!("📊 Processing device messages from {}...", source.source_name());

        loop {
            let event = tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!("[ProcessingLoop] Shutdown signal received");
                    break;
                }
                result = source.next_message() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            warn!("[ProcessingLoop] Source error: {}", e);
                            break;
                        }
                    }
                }
            };

            let message = match event {
                SourceEvent::Message(m) => m,
                SourceEvent::Eof => {
                    info!("[ProcessingLoop] Source reached end ({} messages)", messages);
                    break;
                }
            };

            messages += 1;
            counters.add_messages_received(1);

            if !self.drop_when_full {
                let reserved = tokio::select! {
                    () = self.cancel_token.cancelled() => {
                        info!("[ProcessingLoop] Shutdown signal received");
                        break;
                    }
                    reserved = self.pipeline.reserve() => reserved,
                };
                if !reserved {
                    warn!("[ProcessingLoop] Pipeline worker stopped, ending ingestion");
                    break;
                }
            }

            if let Err(e) = self.router.dispatch(message) {
                counters.add_decode_errors(1);
                warn!(error = %e, "Dropping undecodable message");
            }

            if messages % PROGRESS_INTERVAL == 0 {
                info!("📈 Progress: {}", counters.snapshot());
            }
        }

        let stats = self.pipeline.shutdown(&self.router).await;
        log_final_stats(&stats);
        stats
    }
}

fn log_final_stats(stats: &PipelineStats) {
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("📊 FINAL STATISTICS");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("   Messages Received:   {}", stats.messages_received);
    info!("   Decode Errors:       {}", stats.decode_errors);
    info!("   Events Dropped:      {}", stats.events_dropped);
    info!("   Probes Processed:    {}", stats.probes_processed);
    info!("   Probes Skipped:      {}", stats.probes_skipped);
    info!("   Lookup Failures:     {}", stats.lookup_failures);
    info!("   Alerts Fired:        {}", stats.alerts_fired);
    info!("   Alerts Closed:       {}", stats.alerts_closed);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
