//! Request correlation registry.
//!
//! Maps request ids to the continuation of a waiting `send`. Every entry is
//! settled at most once: by the first matching response, by expiry, by
//! cancellation or by shutdown. Later envelopes for the same id are ignored.

use crate::domain::envelope::InboundEnvelope;
use crate::domain::error::BridgeError;
use crate::domain::request_id::{RequestId, RequestIdCounter};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// How a pending request ended, as seen by its waiter.
#[derive(Debug)]
pub enum Settlement {
    /// Matching response without `errorType`
    Resolved(InboundEnvelope),
    /// Matching response with `errorType`
    Rejected(InboundEnvelope),
    /// Evicted by the expiry sweep
    Expired { after: Duration },
    /// Cancelled by shutdown
    Cancelled,
}

/// A pending request waiting for its response
struct PendingRequest {
    /// Channel to deliver the settlement
    sender: oneshot::Sender<Settlement>,
    /// When the request was registered
    created_at: Instant,
    /// Method name (for logging)
    method: String,
    /// Deadline for this request, `None` for no deadline
    timeout: Option<Duration>,
}

impl PendingRequest {
    fn is_expired(&self, now: Instant) -> bool {
        self.timeout
            .is_some_and(|timeout| now.duration_since(self.created_at) > timeout)
    }
}

/// Statistics for the correlation registry
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Total requests settled with a success envelope
    pub total_resolved: AtomicU64,
    /// Total requests settled with an error envelope
    pub total_rejected: AtomicU64,
    /// Total requests that hit their deadline
    pub total_timeouts: AtomicU64,
    /// Total requests cancelled (waiter dropped, transport failure, shutdown)
    pub total_cancelled: AtomicU64,
    /// Responses that matched no pending request
    pub total_unmatched: AtomicU64,
}

impl PendingStats {
    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> PendingStatsSnapshot {
        PendingStatsSnapshot {
            registered: self.total_registered.load(Ordering::Relaxed),
            resolved: self.total_resolved.load(Ordering::Relaxed),
            rejected: self.total_rejected.load(Ordering::Relaxed),
            timeouts: self.total_timeouts.load(Ordering::Relaxed),
            cancelled: self.total_cancelled.load(Ordering::Relaxed),
            unmatched: self.total_unmatched.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`PendingStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingStatsSnapshot {
    pub registered: u64,
    pub resolved: u64,
    pub rejected: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub unmatched: u64,
}

/// Correlation registry for in-flight requests.
///
/// Flow:
/// 1. Facade calls `reserve()` for an id (generated or caller-supplied)
/// 2. Facade calls `register()` to get a oneshot receiver
/// 3. Facade posts the outbound envelope
/// 4. Dispatcher hands every inbound envelope to `settle()`
/// 5. The waiter receives exactly one [`Settlement`]
pub struct CorrelationRegistry {
    /// Map of request id to pending request
    pending: DashMap<RequestId, PendingRequest>,
    /// Generator for machine ids
    counter: RequestIdCounter,
    /// Statistics
    stats: PendingStats,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            counter: RequestIdCounter::new(),
            stats: PendingStats::default(),
        }
    }

    /// Pick the id for a new request.
    ///
    /// A caller-supplied id is returned as-is unless it is currently pending.
    /// Generated ids skip any value a caller has claimed and left pending.
    pub fn reserve(&self, custom_id: Option<RequestId>) -> Result<RequestId, BridgeError> {
        match custom_id {
            Some(id) if self.pending.contains_key(&id) => {
                warn!(request_id = %id, "Rejecting caller-supplied request id already in flight");
                Err(BridgeError::DuplicateRequestId(id))
            }
            Some(id) => Ok(id),
            None => loop {
                let id = self.counter.next_id();
                if !self.pending.contains_key(&id) {
                    return Ok(id);
                }
                trace!(request_id = %id, "Skipping generated id held by caller");
            },
        }
    }

    /// Register a continuation for `request_id` and get its receiver.
    ///
    /// Fails if the id is already pending; the existing entry is untouched.
    pub fn register(
        &self,
        request_id: RequestId,
        method: &str,
        timeout: Option<Duration>,
    ) -> Result<oneshot::Receiver<Settlement>, BridgeError> {
        let (tx, rx) = oneshot::channel();

        match self.pending.entry(request_id.clone()) {
            Entry::Occupied(_) => return Err(BridgeError::DuplicateRequestId(request_id)),
            Entry::Vacant(slot) => {
                slot.insert(PendingRequest {
                    sender: tx,
                    created_at: Instant::now(),
                    method: method.to_string(),
                    timeout,
                });
            }
        }
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            request_id = %request_id,
            method = method,
            timeout = ?timeout,
            "Registered pending request"
        );

        Ok(rx)
    }

    /// Settle the request matching `request_id` with an inbound envelope.
    ///
    /// `is_success` decides between resolution and rejection. The entry is
    /// removed either way. Returns true if a pending request was found.
    pub fn settle<F>(&self, request_id: &RequestId, envelope: InboundEnvelope, is_success: F) -> bool
    where
        F: FnOnce(&InboundEnvelope) -> bool,
    {
        let Some((_, pending)) = self.pending.remove(request_id) else {
            self.stats.total_unmatched.fetch_add(1, Ordering::Relaxed);
            debug!(
                request_id = %request_id,
                "Response for unknown or already settled request id"
            );
            return false;
        };

        let elapsed = pending.created_at.elapsed();
        let success = is_success(&envelope);
        let settlement = if success {
            self.stats.total_resolved.fetch_add(1, Ordering::Relaxed);
            Settlement::Resolved(envelope)
        } else {
            self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
            Settlement::Rejected(envelope)
        };

        if pending.sender.send(settlement).is_err() {
            // Waiter dropped between its last poll and this response
            debug!(
                request_id = %request_id,
                method = %pending.method,
                "Pending request waiter already gone"
            );
        } else {
            debug!(
                request_id = %request_id,
                method = %pending.method,
                success = success,
                response_time_ms = elapsed.as_millis() as u64,
                "Settled pending request"
            );
        }
        true
    }

    /// Drop a pending request without settling it.
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        if self.pending.remove(request_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Remove a request whose waiter has gone away.
    ///
    /// Only removes the entry if its receiver is closed, so a caller reusing
    /// the same custom id for a newer request is left alone.
    pub fn abandon(&self, request_id: &RequestId) -> bool {
        let removed = self
            .pending
            .remove_if(request_id, |_, pending| pending.sender.is_closed());
        match removed {
            Some((_, pending)) => {
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    request_id = %request_id,
                    method = %pending.method,
                    "Waiter dropped, pending request abandoned"
                );
                true
            }
            None => false,
        }
    }

    /// Expire a single request now, notifying its waiter.
    pub fn expire(&self, request_id: &RequestId) -> bool {
        let Some((_, pending)) = self.pending.remove(request_id) else {
            return false;
        };
        let after = pending.created_at.elapsed();
        warn!(
            request_id = %request_id,
            method = %pending.method,
            elapsed_ms = after.as_millis() as u64,
            "Pending request deadline reached"
        );
        let _ = pending.sender.send(Settlement::Expired { after });
        self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Cancel every pending request, notifying waiters.
    ///
    /// Returns the number of requests cancelled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<RequestId> = self.pending.iter().map(|e| e.key().clone()).collect();
        let mut cancelled = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let _ = pending.sender.send(Settlement::Cancelled);
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Remove expired requests, notifying their waiters.
    ///
    /// Returns the number of requests removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in expired {
            // Re-check under the shard lock: it may have settled meanwhile
            let Some((_, pending)) = self.pending.remove_if(&id, |_, p| p.is_expired(now)) else {
                continue;
            };
            let after = now.duration_since(pending.created_at);
            warn!(
                request_id = %id,
                method = %pending.method,
                elapsed_ms = after.as_millis() as u64,
                "Removing expired pending request"
            );
            let _ = pending.sender.send(Settlement::Expired { after });
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
            removed += 1;
        }
        removed
    }

    /// Get number of currently pending requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a request id is pending
    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.pending.contains_key(request_id)
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task that evicts expired requests.
///
/// Covers waiters that are never polled again, so entries cannot accumulate.
pub async fn sweep_task(registry: Arc<CorrelationRegistry>, interval: Duration) {
    let mut sweep_interval = tokio::time::interval(interval);
    sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        sweep_interval.tick().await;
        let removed = registry.remove_expired();
        if removed > 0 {
            debug!(removed = removed, "Swept expired pending requests");
        }
    }
}
