//! Alert Storage
//!
//! The rule engine consumes a vehicle's open alerts and produces fired and
//! closed alerts; an [`AlertStore`] sits on both ends of that exchange.
//!
//! - `AlertStore`: trait for pluggable backends
//! - `InMemoryAlertStore`: in-memory store for testing and minimal deployments

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::rules::Evaluation;
use crate::types::Alert;

/// Closed alerts kept by the in-memory store before the oldest are evicted.
pub const DEFAULT_MAX_CLOSED: usize = 10_000;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Trait for pluggable alert backends
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across async tasks.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Currently open alerts for one vehicle
    async fn open_alerts(&self, mo_id: &str) -> Result<Vec<Alert>, StoreError>;

    /// Persist the transitions of one evaluation
    async fn apply(&self, evaluation: &Evaluation) -> Result<(), StoreError>;

    /// Every alert held, open first
    async fn all_alerts(&self) -> Result<Vec<Alert>, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// In-Memory Store
// ============================================================================

type AlertKey = (String, String);

fn key_of(alert: &Alert) -> AlertKey {
    (alert.mo_id.clone(), alert.alert_type.clone())
}

#[derive(Default)]
struct Alerts {
    open: HashMap<AlertKey, Alert>,
    /// Oldest first
    closed: VecDeque<Alert>,
}

/// Open alerts keyed by `(mo_id, type)` plus a bounded closed history.
///
/// Storing a fired alert while one of the same key is open keeps the newer
/// of the two (by `ts`) open and closes the older one now.
pub struct InMemoryAlertStore {
    alerts: RwLock<Alerts>,
    max_closed: usize,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CLOSED)
    }

    pub fn with_capacity(max_closed: usize) -> Self {
        Self {
            alerts: RwLock::new(Alerts::default()),
            max_closed,
        }
    }

    pub fn open_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.open.len())
    }

    pub fn closed_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        Ok(self.read()?.closed.iter().cloned().collect())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Alerts>, StoreError> {
        self.alerts
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    fn push_closed(alerts: &mut Alerts, alert: Alert, max_closed: usize) {
        alerts.closed.push_back(alert);
        while alerts.closed.len() > max_closed {
            alerts.closed.pop_front();
        }
    }
}

impl Default for InMemoryAlertStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn open_alerts(&self, mo_id: &str) -> Result<Vec<Alert>, StoreError> {
        Ok(self
            .read()?
            .open
            .values()
            .filter(|a| a.mo_id == mo_id)
            .cloned()
            .collect())
    }

    async fn apply(&self, evaluation: &Evaluation) -> Result<(), StoreError> {
        let mut alerts = self
            .alerts
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        for closed in &evaluation.closed {
            let key = key_of(closed);
            let is_current = alerts
                .open
                .get(&key)
                .is_some_and(|open| open.ts == closed.ts);
            if is_current {
                alerts.open.remove(&key);
            } else {
                warn!(
                    mo_id = %closed.mo_id,
                    alert_type = %closed.alert_type,
                    "Closed alert was not the open one, recording it anyway"
                );
            }
            Self::push_closed(&mut alerts, closed.clone(), self.max_closed);
        }

        for fired in &evaluation.fired {
            let key = key_of(fired);
            let older = match alerts.open.remove(&key) {
                Some(existing) if existing.ts > fired.ts => {
                    // Existing alert is newer: it stays open
                    alerts.open.insert(key, existing);
                    fired.clone()
                }
                Some(existing) => {
                    alerts.open.insert(key, fired.clone());
                    existing
                }
                None => {
                    alerts.open.insert(key, fired.clone());
                    continue;
                }
            };
            debug!(mo_id = %older.mo_id, alert_type = %older.alert_type, "Closing duplicate open alert");
            let now = chrono::Utc::now().timestamp_millis();
            Self::push_closed(&mut alerts, older.closed_at(now), self.max_closed);
        }
        Ok(())
    }

    async fn all_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        let alerts = self.read()?;
        let mut open: Vec<Alert> = alerts.open.values().cloned().collect();
        open.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.mo_id.cmp(&b.mo_id)));
        open.extend(alerts.closed.iter().cloned());
        Ok(open)
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}
