//! Lifecycle event stream consumed by the notification emitter
//!
//! The engine never writes Notification or Message rows itself. It hands
//! lifecycle events to an [`EventSink`] after the storage transaction has
//! committed; delivery is at-least-once and the consumer is expected to be
//! idempotent. A failed delivery is logged and retried on a background
//! worker with exponential backoff, and never fails the lifecycle
//! operation that produced it.

use crate::ids::{ProductId, RequestId, SwapId, UserId};
use anyhow::anyhow;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    SwapRequested {
        request: RequestId,
    },
    SwapAccepted {
        request: RequestId,
        swap: SwapId,
    },
    SwapRejected {
        request: RequestId,
    },
    SwapCancelled {
        request: RequestId,
        swap: Option<SwapId>,
    },
    SwapCompleted {
        request: RequestId,
        swap: SwapId,
    },
    ReviewSubmitted {
        reviewer: UserId,
        reviewee: UserId,
        product: ProductId,
    },
}

/// The notification collaborator seam. Implementations persist and deliver
/// Notification/Message rows; the engine only pushes events through here.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &LifecycleEvent) -> anyhow::Result<()>;
}

/// Records events in memory. Used by tests and by embedders that poll
/// events instead of pushing them.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<LifecycleEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn deliver(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| anyhow!("memory sink mutex poisoned"))?;
        events.push(event.clone());
        Ok(())
    }
}

const MAX_DELIVERY_ATTEMPTS: u32 = 5;
const RETRY_BASE_MS: u64 = 50;

enum Retry {
    Event { event: LifecycleEvent, attempt: u32 },
    Stop,
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(RETRY_BASE_MS << attempt.min(5))
}

/// Post-commit event dispatcher. Delivery failures never propagate to the
/// lifecycle operation; they move to the retry worker instead.
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
    retry: Mutex<mpsc::Sender<Retry>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl EventEmitter {
    pub fn spawn(sink: Arc<dyn EventSink>) -> Self {
        let (tx, rx) = mpsc::channel();
        let worker_sink = Arc::clone(&sink);
        let requeue = tx.clone();

        let worker = thread::spawn(move || {
            while let Ok(message) = rx.recv() {
                let (event, attempt) = match message {
                    Retry::Stop => break,
                    Retry::Event { event, attempt } => (event, attempt),
                };

                thread::sleep(backoff(attempt));
                if let Err(err) = worker_sink.deliver(&event) {
                    if attempt + 1 < MAX_DELIVERY_ATTEMPTS {
                        let _ = requeue.send(Retry::Event {
                            event,
                            attempt: attempt + 1,
                        });
                    } else {
                        log::warn!(
                            "dropping event after {MAX_DELIVERY_ATTEMPTS} delivery attempts: {err}"
                        );
                    }
                }
            }
        });

        Self {
            sink,
            retry: Mutex::new(tx),
            worker: Some(worker),
        }
    }

    /// Fire-and-forget. Tries the sink inline; on failure the event is
    /// handed to the retry worker.
    pub fn emit(&self, event: LifecycleEvent) {
        if let Err(err) = self.sink.deliver(&event) {
            log::warn!("event delivery failed, scheduling retry: {err}");
            if let Ok(retry) = self.retry.lock() {
                let _ = retry.send(Retry::Event { event, attempt: 0 });
            }
        }
    }
}

impl Drop for EventEmitter {
    // Queued retries ahead of the stop marker still drain before shutdown.
    fn drop(&mut self) {
        if let Ok(retry) = self.retry.lock() {
            let _ = retry.send(Retry::Stop);
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    /// Fails the first `failures` deliveries, then behaves like MemorySink.
    struct FlakySink {
        failures: AtomicU32,
        inner: MemorySink,
    }

    impl EventSink for FlakySink {
        fn deliver(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(anyhow!("sink offline"));
            }
            self.inner.deliver(event)
        }
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        let first = LifecycleEvent::SwapRequested {
            request: RequestId::new(),
        };
        let second = LifecycleEvent::SwapRejected {
            request: RequestId::new(),
        };

        sink.deliver(&first).unwrap();
        sink.deliver(&second).unwrap();

        assert_eq!(sink.snapshot(), vec![first, second]);
    }

    #[test]
    fn emitter_retries_until_the_sink_recovers() {
        let sink = Arc::new(FlakySink {
            failures: AtomicU32::new(2),
            inner: MemorySink::new(),
        });
        let emitter = EventEmitter::spawn(sink.clone());

        let event = LifecycleEvent::SwapRequested {
            request: RequestId::new(),
        };
        emitter.emit(event.clone());

        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.inner.snapshot().is_empty() {
            assert!(Instant::now() < deadline, "retry never delivered the event");
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(sink.inner.snapshot(), vec![event]);
    }
}
