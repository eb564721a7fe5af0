//! Ordered listener fan-out with per-listener failure isolation.

use crate::domain::envelope::InboundEnvelope;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Callback receiving every inbound envelope.
pub type Listener = Arc<dyn Fn(&InboundEnvelope) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
///
/// Ids increase with registration, so ordering by id is registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct Registered {
    listener: Listener,
    /// Cleared on unsubscribe so in-flight dispatches skip the listener
    active: Arc<AtomicBool>,
}

/// Outcome of dispatching one envelope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that returned normally
    pub delivered: usize,
    /// Listeners that panicked
    pub failed: usize,
    /// Listeners unsubscribed while the dispatch was in progress
    pub skipped: usize,
}

/// Dispatcher statistics
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Envelopes dispatched
    pub total_dispatched: AtomicU64,
    /// Individual listener deliveries
    pub total_deliveries: AtomicU64,
    /// Listener panics caught
    pub total_listener_panics: AtomicU64,
}

/// Ordered collection of listeners.
pub struct Dispatcher {
    listeners: RwLock<BTreeMap<ListenerId, Registered>>,
    next_id: AtomicU64,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            stats: DispatchStats::default(),
        }
    }

    /// Register a listener; it receives envelopes after all earlier ones.
    pub fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().insert(
            id,
            Registered {
                listener,
                active: Arc::new(AtomicBool::new(true)),
            },
        );
        debug!(listener = %id, "Listener subscribed");
        id
    }

    /// Remove a listener. Unknown ids are a no-op returning false.
    ///
    /// Takes effect immediately, including for a dispatch already running.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        match self.listeners.write().remove(&id) {
            Some(registered) => {
                registered.active.store(false, Ordering::Release);
                debug!(listener = %id, "Listener unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Deliver `envelope` to every active listener in registration order.
    ///
    /// Listeners run outside the lock, so they may subscribe or unsubscribe
    /// (themselves or others) while being called. A panicking listener is
    /// logged and counted; the remaining listeners still run.
    pub fn dispatch(&self, envelope: &InboundEnvelope) -> DispatchReport {
        let snapshot: Vec<(ListenerId, Listener, Arc<AtomicBool>)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, r)| (*id, Arc::clone(&r.listener), Arc::clone(&r.active)))
            .collect();

        let mut report = DispatchReport::default();
        for (id, listener, active) in snapshot {
            if !active.load(Ordering::Acquire) {
                report.skipped += 1;
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| listener(envelope))) {
                Ok(()) => report.delivered += 1,
                Err(panic) => {
                    report.failed += 1;
                    self.stats
                        .total_listener_panics
                        .fetch_add(1, Ordering::Relaxed);
                    error!(
                        listener = %id,
                        origin = envelope.origin(),
                        panic = panic_message(panic.as_ref()),
                        "Listener panicked during dispatch"
                    );
                }
            }
        }

        self.stats.total_dispatched.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        trace!(
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "Dispatched inbound envelope"
        );
        report
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_subscribed(&self, id: ListenerId) -> bool {
        self.listeners.read().contains_key(&id)
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "non-string panic payload"
    }
}
