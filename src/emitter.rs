//! Fire-and-forget tap emission.
//!
//! The redirect path only sees [`TapRecorder::record`], which returns
//! immediately. [`TapEmitter`] puts the event on a bounded queue; a
//! background task drains the queue and runs at most `max_in_flight`
//! deliveries at once, each bounded by `attempt_timeout`.
//!
//! ```text
//! request task ──record()──▶ [bounded queue] ──▶ drain task ──▶ sink.deliver()
//!      │                        full? drop            │           (timeout, no retry)
//!      ▼                                              ▼
//!  302 response                               stats: delivered / failed
//! ```
//!
//! Nothing on this path can delay or fail a redirect: a full queue drops the
//! event, and delivery errors and timeouts are logged and counted.

use crate::sinks::TapSink;
use crate::tap::TapEvent;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Default number of events that may wait for delivery.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default number of concurrent delivery attempts.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 32;

/// Default bound on a single delivery attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Capability handed to the router: submit a tap and return immediately.
///
/// Implementations must not block and must not surface failures.
pub trait TapRecorder: Send + Sync {
    fn record(&self, event: TapEvent);
}

#[derive(Debug, Clone)]
pub struct EmitterConfig {
    pub queue_capacity: usize,
    pub max_in_flight: usize,
    pub attempt_timeout: Duration,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Emission counters.
#[derive(Debug, Default)]
struct EmitterStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the emission counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmitterSnapshot {
    pub submitted: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub failed: u64,
}

/// Queue-backed [`TapRecorder`]. Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct TapEmitter {
    sender: mpsc::Sender<TapEvent>,
    stats: Arc<EmitterStats>,
}

/// Handle on the background drain task.
pub struct EmitterWorker {
    handle: JoinHandle<()>,
}

impl TapEmitter {
    /// Start the drain task on the current runtime.
    pub fn spawn(sink: Arc<dyn TapSink>, config: EmitterConfig) -> (Self, EmitterWorker) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(EmitterStats::default());

        info!(
            sink = %sink.name(),
            queue_capacity = config.queue_capacity,
            max_in_flight = config.max_in_flight,
            attempt_timeout_ms = config.attempt_timeout.as_millis() as u64,
            "Tap emitter started"
        );

        let handle = tokio::spawn(drain(receiver, sink, config, stats.clone()));

        (Self { sender, stats }, EmitterWorker { handle })
    }

    pub fn stats(&self) -> EmitterSnapshot {
        EmitterSnapshot {
            submitted: self.stats.submitted.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }
}

impl TapRecorder for TapEmitter {
    fn record(&self, event: TapEvent) {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(uid = %event.uid, "Tap queue full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(uid = %event.uid, "Tap emitter stopped, dropping event");
            }
        }
    }
}

impl EmitterWorker {
    /// Wait for queued and in-flight deliveries to finish.
    ///
    /// Only completes once every [`TapEmitter`] clone has been dropped.
    /// Returns `false` if `deadline` passed first, in which case remaining
    /// work is abandoned.
    pub async fn drain(self, deadline: Duration) -> bool {
        let abort = self.handle.abort_handle();
        match tokio::time::timeout(deadline, self.handle).await {
            Ok(_) => {
                info!("Tap emitter drained");
                true
            }
            Err(_) => {
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "Tap emitter drain deadline reached, abandoning pending events"
                );
                abort.abort();
                false
            }
        }
    }
}

async fn drain(
    mut receiver: mpsc::Receiver<TapEvent>,
    sink: Arc<dyn TapSink>,
    config: EmitterConfig,
    stats: Arc<EmitterStats>,
) {
    let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
    let mut in_flight = JoinSet::new();

    while let Some(event) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        let sink = sink.clone();
        let stats = stats.clone();
        let timeout = config.attempt_timeout;
        in_flight.spawn(async move {
            let _permit = permit;
            attempt(sink.as_ref(), &event, timeout, &stats).await;
        });

        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
}

async fn attempt(sink: &dyn TapSink, event: &TapEvent, timeout: Duration, stats: &EmitterStats) {
    match tokio::time::timeout(timeout, sink.deliver(event)).await {
        Ok(Ok(())) => {
            stats.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!(sink = %sink.name(), uid = %event.uid, error = %e, "Tap delivery failed");
        }
        Err(_) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                sink = %sink.name(),
                uid = %event.uid,
                timeout_ms = timeout.as_millis() as u64,
                "Tap delivery timed out"
            );
        }
    }
}

/// In-memory [`TapRecorder`] that keeps every event it is given.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<TapEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TapEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TapRecorder for MemoryRecorder {
    fn record(&self, event: TapEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
