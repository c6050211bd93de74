//! Serial Queue - one-at-a-time execution of asynchronous tasks
//!
//! Tasks run strictly in submission order and never overlap: the next task
//! starts only after the previous task's `done`/`error` callback has returned
//! and a short yield delay has elapsed. `clear()` cancels tasks that have not
//! started yet; a running task is never interrupted.
//!
//! ```ignore
//! let queue = SerialQueue::new(QueueConfig::default());
//! queue.push(
//!     QueuedTask::new(cmd, |cmd| async move { send(cmd).await })
//!         .on_done(|_| info!("sent"))
//!         .on_canceled(|cmd| warn!(?cmd, "dropped")),
//! );
//! ```

use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::defaults::QUEUE_YIELD_DELAY_MS;

// ============================================================================
// Configuration & Errors
// ============================================================================

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Pause between one task finishing and the next starting
    pub yield_delay: Duration,
    /// Abandon a task whose `run` takes longer than this. `None` waits forever,
    /// so a hung task stalls the queue.
    pub task_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            yield_delay: Duration::from_millis(QUEUE_YIELD_DELAY_MS),
            task_timeout: None,
        }
    }
}

/// Why a task did not produce a result. Delivered to the task's `error` callback.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task failed: {0:#}")]
    Failed(anyhow::Error),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task timed out after {0:?}")]
    TimedOut(Duration),
}

// ============================================================================
// Queued Task
// ============================================================================

type RunFn<P, T> = Box<dyn FnOnce(P) -> BoxFuture<'static, anyhow::Result<T>> + Send>;

/// A unit of work: parameters, an async run function and optional callbacks.
///
/// Owned by the queue from `push` until exactly one of `done`, `error` or
/// `canceled` has been invoked.
pub struct QueuedTask<P, T> {
    params: P,
    run: RunFn<P, T>,
    done: Option<Box<dyn FnOnce(T) + Send>>,
    error: Option<Box<dyn FnOnce(TaskError) + Send>>,
    canceled: Option<Box<dyn FnOnce(P) + Send>>,
}

impl<P: Send + 'static, T: Send + 'static> QueuedTask<P, T> {
    pub fn new<F, Fut>(params: P, run: F) -> Self
    where
        F: FnOnce(P) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            params,
            run: Box::new(move |p| run(p).boxed()),
            done: None,
            error: None,
            canceled: None,
        }
    }

    /// Called with the result when `run` succeeds.
    pub fn on_done(mut self, f: impl FnOnce(T) + Send + 'static) -> Self {
        self.done = Some(Box::new(f));
        self
    }

    /// Called when `run` fails, panics or times out.
    pub fn on_error(mut self, f: impl FnOnce(TaskError) + Send + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Called with the original params when the task is cleared before it starts.
    pub fn on_canceled(mut self, f: impl FnOnce(P) + Send + 'static) -> Self {
        self.canceled = Some(Box::new(f));
        self
    }
}

// ============================================================================
// Serial Queue
// ============================================================================

struct QueueState<P, T> {
    pending: VecDeque<QueuedTask<P, T>>,
    running: bool,
}

/// FIFO task runner with at most one task in flight.
///
/// Cloning yields another handle to the same queue. `push` must be called
/// from within a Tokio runtime; the worker is a spawned task that exits when
/// the queue drains and is restarted by the next `push`.
pub struct SerialQueue<P, T> {
    state: Arc<Mutex<QueueState<P, T>>>,
    config: QueueConfig,
}

impl<P, T> Clone for SerialQueue<P, T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            config: self.config.clone(),
        }
    }
}

impl<P: Send + 'static, T: Send + 'static> SerialQueue<P, T> {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                pending: VecDeque::new(),
                running: false,
            })),
            config,
        }
    }

    /// Append a task; starts the worker if the queue is idle.
    pub fn push(&self, task: QueuedTask<P, T>) {
        let start_worker = {
            let mut state = lock(&self.state);
            state.pending.push_back(task);
            !std::mem::replace(&mut state.running, true)
        };
        if start_worker {
            debug!("Serial queue worker starting");
            tokio::spawn(drain(Arc::clone(&self.state), self.config.clone()));
        }
    }

    /// Discard every task that has not started and invoke its `canceled`
    /// callback with its params. Returns the number of tasks discarded.
    pub fn clear(&self) -> usize {
        let cleared: Vec<QueuedTask<P, T>> = lock(&self.state).pending.drain(..).collect();
        let count = cleared.len();
        for QueuedTask { params, canceled, .. } in cleared {
            if let Some(canceled) = canceled {
                guard_callback("canceled", move || canceled(params));
            }
        }
        if count > 0 {
            debug!(count, "Serial queue cleared");
        }
        count
    }

    /// Tasks waiting to start (the running task is not counted).
    pub fn len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when no task is running and none is waiting.
    pub fn is_idle(&self) -> bool {
        let state = lock(&self.state);
        !state.running && state.pending.is_empty()
    }
}

fn lock<P, T>(state: &Mutex<QueueState<P, T>>) -> MutexGuard<'_, QueueState<P, T>> {
    // Callbacks never run under the lock, so a poisoned state is still consistent
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Worker loop: run tasks until the queue is empty, then go idle.
async fn drain<P: Send + 'static, T: Send + 'static>(
    state: Arc<Mutex<QueueState<P, T>>>,
    config: QueueConfig,
) {
    loop {
        let task = {
            let mut guard = lock(&state);
            match guard.pending.pop_front() {
                Some(task) => task,
                None => {
                    guard.running = false;
                    return;
                }
            }
        };

        run_task(task, &config).await;

        {
            let mut guard = lock(&state);
            if guard.pending.is_empty() {
                guard.running = false;
                debug!("Serial queue idle");
                return;
            }
        }
        tokio::time::sleep(config.yield_delay).await;
    }
}

async fn run_task<P, T>(task: QueuedTask<P, T>, config: &QueueConfig) {
    let QueuedTask {
        params,
        run,
        done,
        error,
        ..
    } = task;

    let outcome = match std::panic::catch_unwind(AssertUnwindSafe(move || run(params))) {
        Ok(future) => {
            let guarded = AssertUnwindSafe(future).catch_unwind();
            match config.task_timeout {
                Some(limit) => match tokio::time::timeout(limit, guarded).await {
                    Ok(result) => flatten(result),
                    Err(_) => Err(TaskError::TimedOut(limit)),
                },
                None => flatten(guarded.await),
            }
        }
        Err(panic) => Err(TaskError::Panicked(panic_message(panic.as_ref()))),
    };

    match outcome {
        Ok(value) => {
            if let Some(done) = done {
                guard_callback("done", move || done(value));
            }
        }
        Err(e) => {
            warn!(error = %e, "Queued task failed");
            if let Some(on_error) = error {
                guard_callback("error", move || on_error(e));
            }
        }
    }
}

fn flatten<T>(result: Result<anyhow::Result<T>, Box<dyn Any + Send>>) -> Result<T, TaskError> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TaskError::Failed(e)),
        Err(panic) => Err(TaskError::Panicked(panic_message(panic.as_ref()))),
    }
}

/// Run a user callback, containing any panic so the queue keeps going.
fn guard_callback(name: &'static str, f: impl FnOnce()) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        error!(callback = name, panic = %panic_message(panic.as_ref()), "Queue callback panicked");
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{mpsc, oneshot};

    fn fast_config() -> QueueConfig {
        QueueConfig {
            yield_delay: Duration::from_millis(1),
            task_timeout: None,
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("queue stalled")
            .expect("channel closed")
    }

    fn logged_task(
        name: &'static str,
        delay_ms: u64,
        log: mpsc::UnboundedSender<String>,
    ) -> QueuedTask<&'static str, &'static str> {
        let run_log = log.clone();
        let done_log = log.clone();
        QueuedTask::new(name, move |name| async move {
            let _ = run_log.send(format!("start:{name}"));
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Ok(name)
        })
        .on_done(move |name| {
            let _ = done_log.send(format!("done:{name}"));
        })
        .on_canceled(move |name| {
            let _ = log.send(format!("canceled:{name}"));
        })
    }

    #[tokio::test]
    async fn test_tasks_complete_in_submission_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = SerialQueue::new(QueueConfig::default());

        queue.push(logged_task("T1", 50, tx.clone()));
        queue.push(logged_task("T2", 0, tx.clone()));
        queue.push(logged_task("T3", 0, tx.clone()));

        let mut events = Vec::new();
        for _ in 0..6 {
            events.push(next(&mut rx).await);
        }
        assert_eq!(
            events,
            vec!["start:T1", "done:T1", "start:T2", "done:T2", "start:T3", "done:T3"]
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn test_clear_cancels_only_pending_tasks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (started_tx, started_rx) = oneshot::channel();
        let queue = SerialQueue::new(fast_config());

        let log = tx.clone();
        queue.push(
            QueuedTask::new("T1", move |name| async move {
                let _ = started_tx.send(());
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(name)
            })
            .on_done(move |name| {
                let _ = log.send(format!("done:{name}"));
            }),
        );
        queue.push(logged_task("T2", 0, tx.clone()));
        queue.push(logged_task("T3", 0, tx.clone()));

        started_rx.await.unwrap();
        assert_eq!(queue.clear(), 2);

        assert_eq!(next(&mut rx).await, "canceled:T2");
        assert_eq!(next(&mut rx).await, "canceled:T3");
        assert_eq!(next(&mut rx).await, "done:T1");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err(), "cleared tasks must not run");
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn test_failure_does_not_halt_queue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue: SerialQueue<u32, u32> = SerialQueue::new(fast_config());

        let err_log = tx.clone();
        queue.push(
            QueuedTask::new(1, |_| async { Err(anyhow::anyhow!("device offline")) }).on_error(
                move |e| {
                    let _ = err_log.send(format!("error:{e}"));
                },
            ),
        );
        let done_log = tx.clone();
        queue.push(QueuedTask::new(2, |n| async move { Ok(n * 10) }).on_done(move |v| {
            let _ = done_log.send(format!("done:{v}"));
        }));

        let first = next(&mut rx).await;
        assert!(first.starts_with("error:"), "{first}");
        assert!(first.contains("device offline"));
        assert_eq!(next(&mut rx).await, "done:20");
    }

    #[tokio::test]
    async fn test_panicking_run_routes_to_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue: SerialQueue<(), ()> = SerialQueue::new(fast_config());

        let err_log = tx.clone();
        queue.push(
            QueuedTask::new((), |_| async { panic!("boom") }).on_error(move |e| {
                let _ = err_log.send(matches!(e, TaskError::Panicked(ref m) if m == "boom").to_string());
            }),
        );
        let done_log = tx.clone();
        queue.push(QueuedTask::new((), |_| async { Ok(()) }).on_done(move |()| {
            let _ = done_log.send("done".to_string());
        }));

        assert_eq!(next(&mut rx).await, "true");
        assert_eq!(next(&mut rx).await, "done");
    }

    #[tokio::test]
    async fn test_timeout_abandons_hung_task() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue: SerialQueue<(), ()> = SerialQueue::new(QueueConfig {
            yield_delay: Duration::from_millis(1),
            task_timeout: Some(Duration::from_millis(20)),
        });

        let err_log = tx.clone();
        queue.push(
            QueuedTask::new((), |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .on_error(move |e| {
                let _ = err_log.send(matches!(e, TaskError::TimedOut(_)).to_string());
            }),
        );
        let done_log = tx.clone();
        queue.push(QueuedTask::new((), |_| async { Ok(()) }).on_done(move |()| {
            let _ = done_log.send("done".to_string());
        }));

        assert_eq!(next(&mut rx).await, "true");
        assert_eq!(next(&mut rx).await, "done");
    }

    #[tokio::test]
    async fn test_restarts_after_idle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = SerialQueue::new(fast_config());

        queue.push(logged_task("A", 0, tx.clone()));
        assert_eq!(next(&mut rx).await, "start:A");
        assert_eq!(next(&mut rx).await, "done:A");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(queue.is_idle());

        queue.push(logged_task("B", 0, tx.clone()));
        assert_eq!(next(&mut rx).await, "start:B");
        assert_eq!(next(&mut rx).await, "done:B");
    }

    #[tokio::test]
    async fn test_panicking_cancel_callback_is_contained() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let queue = SerialQueue::new(fast_config());

        queue.push(QueuedTask::new("T1", move |name| async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
            Ok(name)
        }));
        queue.push(QueuedTask::new("T2", |name| async move { Ok(name) }).on_canceled(|_| panic!("bad callback")));
        queue.push(logged_task("T3", 0, tx.clone()));

        started_rx.await.unwrap();
        assert_eq!(queue.clear(), 2);
        assert_eq!(next(&mut rx).await, "canceled:T3");
        let _ = release_tx.send(());

        // Queue still accepts and runs work
        queue.push(logged_task("T4", 0, tx.clone()));
        assert_eq!(next(&mut rx).await, "start:T4");
        assert_eq!(next(&mut rx).await, "done:T4");
    }
}
