//! Pipeline Coordinator - telemetry event → probe → rule evaluation → alert store
//!
//! The coordinator runs on a single worker task fed by a bounded channel. The
//! router handler only enqueues, so directory lookups and store calls never
//! block dispatch, and probes are evaluated one at a time in arrival order.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::state::{PipelineCounters, PipelineStats};
use super::tracker::VehicleTracker;
use crate::acquisition::{AssetDirectory, NormalizeError, ProbeNormalizer};
use crate::config::FleetConfig;
use crate::router::{EventRouter, RouterError, SubscriptionId};
use crate::rules::{Evaluation, RuleEngine};
use crate::storage::AlertStore;
use crate::types::{DeviceEvent, Probe};

pub struct PipelineCoordinator {
    normalizer: ProbeNormalizer,
    engine: RuleEngine,
    store: Arc<dyn AlertStore>,
    tracker: VehicleTracker,
    counters: Arc<PipelineCounters>,
}

impl PipelineCoordinator {
    pub fn new(
        normalizer: ProbeNormalizer,
        engine: RuleEngine,
        store: Arc<dyn AlertStore>,
        directory: Arc<dyn AssetDirectory>,
    ) -> Self {
        Self {
            normalizer,
            engine,
            store,
            tracker: VehicleTracker::new(directory),
            counters: Arc::new(PipelineCounters::default()),
        }
    }

    /// Wire the normalizer, rule engine and tracker from config.
    pub fn from_config(
        config: &FleetConfig,
        directory: Arc<dyn AssetDirectory>,
        store: Arc<dyn AlertStore>,
    ) -> Self {
        let normalizer = ProbeNormalizer::new(
            config.transport.vehicle_device_type.clone(),
            Arc::clone(&directory),
        );
        let engine = RuleEngine::from_config(&config.rules);
        info!(
            rules = ?engine.rule_names(),
            store = store.backend_name(),
            "Pipeline coordinator initialized"
        );
        Self::new(normalizer, engine, store, directory)
    }

    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    pub fn tracker(&self) -> &VehicleTracker {
        &self.tracker
    }

    /// Normalize a telemetry event and evaluate it.
    ///
    /// Status and command events, skips and lookup failures yield `None`;
    /// none of them are errors for the caller.
    pub async fn handle_event(&mut self, event: &DeviceEvent) -> Option<Evaluation> {
        let DeviceEvent::Telemetry(telemetry) = event else {
            return None;
        };
        match self
            .normalizer
            .normalize(&telemetry.device_type, &telemetry.device_id, &telemetry.payload)
            .await
        {
            Ok(probe) => Some(self.process_probe(probe).await),
            Err(NormalizeError::Skip(reason)) => {
                debug!(device_id = %telemetry.device_id, %reason, "Telemetry skipped");
                self.counters.add_probes_skipped(1);
                None
            }
            Err(NormalizeError::Lookup(e)) => {
                warn!(device_id = %telemetry.device_id, error = %e, "Identity lookup failed, dropping telemetry");
                self.counters.add_lookup_failures(1);
                None
            }
        }
    }

    /// Evaluate one probe against its vehicle's state and open alerts, persist
    /// the transitions, then record the probe as the vehicle's previous probe.
    ///
    /// The previous probe only advances once the store has accepted the
    /// transitions, so a crossing lost to a store failure is detected again
    /// on the next probe.
    pub async fn process_probe(&mut self, mut probe: Probe) -> Evaluation {
        probe
            .ts
            .get_or_insert_with(|| chrono::Utc::now().timestamp_millis());

        let open = match self.store.open_alerts(&probe.mo_id).await {
            Ok(open) => open,
            Err(e) => {
                // Evaluating without the open set would re-fire open alerts
                error!(mo_id = %probe.mo_id, error = %e, "Open alerts unavailable, skipping evaluation");
                self.counters.add_store_errors(1);
                return Evaluation::default();
            }
        };
        let vehicle = self.tracker.vehicle(&probe.mo_id).await;
        let evaluation = self.engine.evaluate(&probe, vehicle, &open);

        if !evaluation.is_empty() {
            if let Err(e) = self.store.apply(&evaluation).await {
                error!(mo_id = %probe.mo_id, error = %e, "Failed to store alert transitions");
                self.counters.add_store_errors(1);
                return Evaluation::default();
            }
        }
        for alert in &evaluation.fired {
            info!(
                mo_id = %alert.mo_id,
                alert_type = %alert.alert_type,
                severity = %alert.severity,
                simulated = alert.simulated,
                "🚨 Alert opened: {}",
                alert.description
            );
        }
        for alert in &evaluation.closed {
            info!(mo_id = %alert.mo_id, alert_type = %alert.alert_type, "Alert closed");
        }

        self.counters.add_probes_processed(1);
        self.counters.add_alerts_fired(evaluation.fired.len() as u64);
        self.counters.add_alerts_closed(evaluation.closed.len() as u64);
        self.counters.add_rule_failures(evaluation.failed_rules.len() as u64);

        self.tracker.record_probe(probe);
        evaluation
    }

    /// Subscribe to the router's global telemetry topic and move the
    /// coordinator onto a worker task.
    ///
    /// Telemetry takes the slot staged by [`PipelineHandle::reserve`] when
    /// there is one. Otherwise it is enqueued only if the channel has room,
    /// and dropped with a warning when `capacity` events are already waiting.
    pub fn attach(self, router: &EventRouter, capacity: usize) -> Result<PipelineHandle, RouterError> {
        let (tx, mut rx) = mpsc::channel::<DeviceEvent>(capacity.max(1));
        let counters = self.counters();
        let handler_counters = Arc::clone(&counters);
        let staged: StagedSlot = Arc::new(Mutex::new(None));
        let handler_staged = Arc::clone(&staged);
        let sender = tx.clone();

        let subscription = router.on("+", move |_topic, event| {
            if !matches!(event, DeviceEvent::Telemetry(_)) {
                return Ok(());
            }
            if let Some(permit) = take_staged(&handler_staged) {
                permit.send(event.clone());
                return Ok(());
            }
            match tx.try_send(event.clone()) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    handler_counters.add_events_dropped(1);
                    warn!(device_id = event.device_id(), "Pipeline channel full, dropping telemetry");
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    anyhow::bail!("pipeline worker has stopped")
                }
            }
        })?;

        let mut coordinator = self;
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                coordinator.handle_event(&event).await;
            }
            debug!("Pipeline worker drained");
            coordinator.stats()
        });

        Ok(PipelineHandle {
            subscription,
            worker,
            counters,
            sender,
            staged,
        })
    }
}

/// Channel slot reserved ahead of dispatch, consumed by the next telemetry event.
type StagedSlot = Arc<Mutex<Option<mpsc::OwnedPermit<DeviceEvent>>>>;

fn take_staged(staged: &StagedSlot) -> Option<mpsc::OwnedPermit<DeviceEvent>> {
    staged.lock().ok().and_then(|mut slot| slot.take())
}

/// A running pipeline worker attached to a router.
pub struct PipelineHandle {
    subscription: SubscriptionId,
    worker: JoinHandle<PipelineStats>,
    counters: Arc<PipelineCounters>,
    sender: mpsc::Sender<DeviceEvent>,
    staged: StagedSlot,
}

impl PipelineHandle {
    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }

    /// Wait until the worker channel has room and stage that slot for the
    /// next routed telemetry event, so dispatching it cannot drop it.
    ///
    /// Returns `false` once the worker has stopped.
    pub async fn reserve(&self) -> bool {
        let already_staged = match self.staged.lock() {
            Ok(slot) => slot.is_some(),
            Err(_) => return false,
        };
        if already_staged {
            return true;
        }
        match self.sender.clone().reserve_owned().await {
            Ok(permit) => match self.staged.lock() {
                Ok(mut slot) => {
                    *slot = Some(permit);
                    true
                }
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    /// Unsubscribe, let the worker finish every queued event, and return the
    /// final statistics.
    pub async fn shutdown(self, router: &EventRouter) -> PipelineStats {
        // The worker loop ends once every sender is gone, staged permits included
        router.off(self.subscription);
        drop(take_staged(&self.staged));
        drop(self.sender);
        match self.worker.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Pipeline worker failed");
                self.counters.snapshot()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::StaticAssetDirectory;
    use crate::config::AssetConfig;
    use crate::storage::{InMemoryAlertStore, StoreError};
    use crate::types::InboundMessage;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (PipelineCoordinator, Arc<InMemoryAlertStore>) {
        let store = Arc::new(InMemoryAlertStore::new());
        (setup_with_store(store.clone()), store)
    }

    fn setup_with_store(store: Arc<dyn AlertStore>) -> PipelineCoordinator {
        let mut config = FleetConfig::default();
        config.assets.push(AssetConfig {
            device_id: "dev-1".to_string(),
            device_type: "vehicle".to_string(),
            vehicle_id: "car-1".to_string(),
            driver_id: Some("driver-1".to_string()),
            vendor: Some("IBM".to_string()),
            properties: BTreeMap::from([("fueltank".to_string(), json!(60))]),
        });
        let directory = Arc::new(StaticAssetDirectory::from_config(&config.assets));
        PipelineCoordinator::from_config(&config, directory, store)
    }

    /// Rejects the first `failures` writes, then delegates to memory.
    struct FailingStore {
        inner: InMemoryAlertStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl AlertStore for FailingStore {
        async fn open_alerts(&self, mo_id: &str) -> Result<Vec<crate::types::Alert>, StoreError> {
            self.inner.open_alerts(mo_id).await
        }

        async fn apply(&self, evaluation: &Evaluation) -> Result<(), StoreError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Storage("disk full".to_string()));
            }
            self.inner.apply(evaluation).await
        }

        async fn all_alerts(&self) -> Result<Vec<crate::types::Alert>, StoreError> {
            self.inner.all_alerts().await
        }

        fn backend_name(&self) -> &'static str {
            "failing"
        }
    }

    fn telemetry(device_id: &str, payload: serde_json::Value) -> InboundMessage {
        InboundMessage::Event {
            device_type: "vehicle".to_string(),
            device_id: device_id.to_string(),
            event_type: "probe".to_string(),
            format: "json".to_string(),
            payload: json!({ "d": payload }).to_string(),
        }
    }

    fn decode(message: InboundMessage) -> DeviceEvent {
        crate::router::decode_message(message).unwrap()
    }

    #[tokio::test]
    async fn test_probe_sequence_opens_and_closes_alert() {
        let (mut coordinator, store) = setup();
        let base = json!({"lat": 35.0, "lng": 139.0, "trip_id": "t1"});
        let with = |ts: i64, level: f64| {
            let mut p = base.clone();
            p["ts"] = json!(ts);
            p["props"] = json!({"fuelLevel": level});
            telemetry("dev-1", p)
        };

        coordinator.handle_event(&decode(with(1, 12.0))).await.unwrap();
        let eval = coordinator.handle_event(&decode(with(2, 8.0))).await.unwrap();
        assert_eq!(eval.fired.len(), 1);
        assert!(eval.fired[0].simulated);
        assert_eq!(store.open_alerts("car-1").await.unwrap().len(), 1);

        // Still low: nothing new
        let eval = coordinator.handle_event(&decode(with(3, 7.0))).await.unwrap();
        assert!(eval.is_empty());

        let eval = coordinator.handle_event(&decode(with(4, 60.0))).await.unwrap();
        assert_eq!(eval.closed.len(), 1);
        assert_eq!(eval.closed[0].closed_ts, Some(4));
        assert!(store.open_alerts("car-1").await.unwrap().is_empty());

        let stats = coordinator.stats();
        assert_eq!(stats.probes_processed, 4);
        assert_eq!(stats.alerts_fired, 1);
        assert_eq!(stats.alerts_closed, 1);
    }

    #[tokio::test]
    async fn test_skips_and_lookup_failures_are_counted() {
        let (mut coordinator, _store) = setup();
        assert!(coordinator.handle_event(&decode(telemetry("dev-1", json!({"lat": 1.0})))).await.is_none());
        let unknown = telemetry("dev-9", json!({"lat": 1.0, "lng": 2.0, "trip_id": "t"}));
        assert!(coordinator.handle_event(&decode(unknown)).await.is_none());

        let stats = coordinator.stats();
        assert_eq!(stats.probes_skipped, 1);
        assert_eq!(stats.lookup_failures, 1);
        assert_eq!(stats.probes_processed, 0);
    }

    #[tokio::test]
    async fn test_missing_ts_is_stamped() {
        let (mut coordinator, _store) = setup();
        let before = chrono::Utc::now().timestamp_millis();
        let payload = json!({"lat": 1.0, "lng": 2.0, "trip_id": "t", "props": {"engineTemp": 150}});
        let eval = coordinator.handle_event(&decode(telemetry("dev-1", payload))).await.unwrap();
        assert!(eval.fired[0].ts.unwrap() >= before);
        assert!(coordinator.tracker().get("car-1").unwrap().prev_probe.as_ref().unwrap().ts.is_some());
    }

    #[tokio::test]
    async fn test_attached_worker_processes_routed_telemetry() {
        let (coordinator, store) = setup();
        let router = EventRouter::new();
        let handle = coordinator.attach(&router, 16).unwrap();

        let payload = json!({"lat": 1.0, "lng": 2.0, "trip_id": "t", "ts": 10, "props": {"engineTemp": 150}});
        router.dispatch(telemetry("dev-1", payload)).unwrap();
        router
            .dispatch(InboundMessage::Status {
                device_type: "vehicle".to_string(),
                device_id: "dev-1".to_string(),
                payload: r#"{"Action":"Connect"}"#.to_string(),
                topic: String::new(),
            })
            .unwrap();

        let stats = handle.shutdown(&router).await;
        assert_eq!(router.subscription_count(), 0);
        assert_eq!(stats.probes_processed, 1);
        assert_eq!(stats.alerts_fired, 1);
        assert_eq!(store.open_alerts("car-1").await.unwrap()[0].alert_type, "high_engine_temp");
    }

    #[tokio::test]
    async fn test_crossing_lost_to_store_failure_fires_on_next_probe() {
        let store = Arc::new(FailingStore {
            inner: InMemoryAlertStore::new(),
            failures: AtomicUsize::new(1),
        });
        let mut coordinator = setup_with_store(store.clone());
        let fuel = |ts: i64, level: f64| {
            decode(telemetry(
                "dev-1",
                json!({"lat": 35.0, "lng": 139.0, "trip_id": "t1", "ts": ts, "props": {"fuelLevel": level}}),
            ))
        };

        coordinator.handle_event(&fuel(1, 12.0)).await.unwrap();
        let lost = coordinator.handle_event(&fuel(2, 8.0)).await.unwrap();
        assert!(lost.is_empty());
        assert_eq!(
            coordinator.tracker().get("car-1").unwrap().prev_probe.as_ref().unwrap().ts,
            Some(1),
            "previous probe must not advance past an unstored crossing"
        );

        let eval = coordinator.handle_event(&fuel(3, 7.0)).await.unwrap();
        assert_eq!(eval.fired.len(), 1);
        assert_eq!(eval.fired[0].alert_type, "low_fuel");
        let open = store.open_alerts("car-1").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].ts, Some(3));

        let stats = coordinator.stats();
        assert_eq!(stats.store_errors, 1);
        assert_eq!(stats.probes_processed, 2);
        assert_eq!(stats.alerts_fired, 1);
    }

    #[tokio::test]
    async fn test_reserved_slot_carries_telemetry_past_full_channel() {
        let (coordinator, store) = setup();
        let router = EventRouter::new();
        let handle = coordinator.attach(&router, 1).unwrap();

        for ts in 1..=20 {
            assert!(handle.reserve().await);
            // A second reserve reuses the staged slot
            assert!(handle.reserve().await);
            let payload = json!({"lat": 1.0, "lng": 2.0, "trip_id": "t", "ts": ts, "props": {"engineTemp": 150}});
            router.dispatch(telemetry("dev-1", payload)).unwrap();
        }

        let stats = handle.shutdown(&router).await;
        assert_eq!(stats.events_dropped, 0);
        assert_eq!(stats.probes_processed, 20);
        assert_eq!(store.open_alerts("car-1").await.unwrap().len(), 1);
    }
}
