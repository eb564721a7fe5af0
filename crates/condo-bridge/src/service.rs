//! Bridge facade: the single entry point an embedded application uses.
//!
//! Wires the capability table, the correlation registry and the dispatcher
//! around one transport. Inbound traffic is drained by a single pump task,
//! so listeners and settlements run one envelope at a time, in arrival order.

use crate::adapters::{ChannelTransport, Counterpart, DetachedTransport};
use crate::dispatch::{Dispatcher, Listener, ListenerId};
use crate::domain::config::BridgeConfig;
use crate::domain::envelope::{BridgeEvent, EnvelopeKind, InboundEnvelope, OutboundEnvelope};
use crate::domain::error::{BridgeError, BridgeResult};
use crate::domain::methods::{get_method_timeout, CapabilityTable, RuntimeContext};
use crate::domain::origin::OriginPolicy;
use crate::domain::pending::{sweep_task, CorrelationRegistry, PendingStatsSnapshot};
use crate::domain::request_id::RequestId;
use crate::ports::inbound::BridgeApi;
use crate::ports::outbound::{Delivery, InboundReceiver, Transport};
use crate::response::PendingResponse;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Deadline policy for a single request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Per-method or configured default, if timeouts are enabled
    #[default]
    Default,
    /// Explicit deadline
    After(Duration),
    /// Wait until a response, drop or shutdown
    Never,
}

/// Per-request options for [`Bridge::send_with`]
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Caller-chosen correlation id instead of a generated one
    pub request_id: Option<RequestId>,
    /// Deadline policy
    pub timeout: TimeoutPolicy,
}

impl SendOptions {
    pub fn with_request_id(mut self, request_id: impl Into<RequestId>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = TimeoutPolicy::After(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.timeout = TimeoutPolicy::Never;
        self
    }
}

/// Combined bridge statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Correlation registry counters
    pub requests: PendingStatsSnapshot,
    /// Requests currently awaiting a response
    pub pending: usize,
    /// Inbound envelopes dispatched
    pub dispatched: u64,
    /// Listener panics caught
    pub listener_panics: u64,
    /// Application listeners currently subscribed
    pub listeners: usize,
}

/// Cross-context RPC bridge.
///
/// Construct one per embedded application and share it by reference or
/// `Arc`. Must be created inside a Tokio runtime.
pub struct Bridge {
    id: Uuid,
    config: BridgeConfig,
    transport: Arc<dyn Transport>,
    capabilities: CapabilityTable,
    registry: Arc<CorrelationRegistry>,
    dispatcher: Arc<Dispatcher>,
    /// Internal listener feeding responses to the registry
    settle_listener: ListenerId,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Bridge {
    /// Create a bridge over `transport`.
    pub fn new(config: BridgeConfig, transport: Arc<dyn Transport>) -> BridgeResult<Self> {
        config.validate()?;
        let handle = Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;
        let inbound = transport.take_inbound()?;

        let id = Uuid::now_v7();
        let capabilities = CapabilityTable::new(config.context, &config.methods);
        let registry = Arc::new(CorrelationRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new());

        // First listener, so responses settle before application listeners run
        let settle_registry = Arc::clone(&registry);
        let settle_listener = dispatcher.subscribe(Arc::new(move |envelope: &InboundEnvelope| {
            match envelope.kind() {
                kind @ (EnvelopeKind::Response { .. } | EnvelopeKind::Failure { .. }) => {
                    if let Some(request_id) = kind.settles() {
                        settle_registry.settle(request_id, envelope.clone(), InboundEnvelope::is_success);
                    }
                }
                EnvelopeKind::Malformed => {
                    trace!(origin = envelope.origin(), "Ignoring malformed inbound payload");
                }
                _ => {}
            }
        }));

        let tasks = vec![
            handle.spawn(pump(id, inbound, Arc::clone(&dispatcher))),
            handle.spawn(sweep_task(
                Arc::clone(&registry),
                config.timeouts.sweep_interval,
            )),
        ];

        info!(
            bridge_id = %id,
            version = %crate::bridge_version(),
            context = ?config.context,
            target_origin = ?transport.origin_policy().target(),
            methods = capabilities.methods().len(),
            "Bridge started"
        );

        Ok(Self {
            id,
            config,
            transport,
            capabilities,
            registry,
            dispatcher,
            settle_listener,
            tasks: Mutex::new(tasks),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Bridge for a page with no host frame; requests wait for their deadline.
    pub fn detached(config: BridgeConfig) -> BridgeResult<Self> {
        let transport = DetachedTransport::new(OriginPolicy::from_config(&config.origins));
        Self::new(config, Arc::new(transport))
    }

    /// Bridge over an in-process channel, with the host end returned alongside.
    pub fn with_counterpart(
        config: BridgeConfig,
        counterpart_origin: &str,
    ) -> BridgeResult<(Self, Counterpart)> {
        let policy = OriginPolicy::from_config(&config.origins);
        let (transport, counterpart) = ChannelTransport::pair(policy, counterpart_origin);
        Ok((Self::new(config, Arc::new(transport))?, counterpart))
    }

    /// Instance id used in logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn context(&self) -> RuntimeContext {
        self.capabilities.context()
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    pub fn origin_policy(&self) -> &OriginPolicy {
        self.transport.origin_policy()
    }

    /// Post a request with default options.
    ///
    /// The envelope is posted before this returns; awaiting the result only
    /// waits for the settlement.
    pub fn send(&self, method: &str, params: Option<Value>) -> PendingResponse {
        self.send_with(method, params, SendOptions::default())
    }

    /// Post a request with explicit options.
    pub fn send_with(&self, method: &str, params: Option<Value>, options: SendOptions) -> PendingResponse {
        if self.shut_down.load(Ordering::Acquire) {
            return PendingResponse::failed(BridgeError::ShutDown);
        }

        if !self.capabilities.supports(method) {
            if self.config.methods.reject_unsupported {
                debug!(bridge_id = %self.id, method = method, "Rejecting unsupported method");
                return PendingResponse::failed(BridgeError::MethodNotSupported {
                    method: method.to_string(),
                });
            }
            trace!(bridge_id = %self.id, method = method, "Posting method outside capability table");
        }

        let request_id = match self.registry.reserve(options.request_id) {
            Ok(id) => id,
            Err(e) => return PendingResponse::failed(e),
        };
        let timeout = self.effective_timeout(method, options.timeout);

        // Register before posting so an immediate reply always finds its entry
        let rx = match self.registry.register(request_id.clone(), method, timeout) {
            Ok(rx) => rx,
            Err(e) => return PendingResponse::failed(e),
        };

        let envelope = OutboundEnvelope::new(method, params, request_id.clone(), crate::VERSION);
        match self.transport.post(&envelope) {
            Ok(Delivery::Posted) => {
                trace!(bridge_id = %self.id, request_id = %request_id, method = method, "Request posted");
            }
            Ok(Delivery::NoCounterpart) => {
                debug!(
                    bridge_id = %self.id,
                    request_id = %request_id,
                    method = method,
                    "No counterpart, request waits for its deadline"
                );
            }
            Err(e) => {
                warn!(bridge_id = %self.id, request_id = %request_id, error = %e, "Failed to post request");
                self.registry.cancel(&request_id);
                return PendingResponse::failed(e.into());
            }
        }

        PendingResponse::waiting(Arc::clone(&self.registry), request_id, method, rx, timeout)
    }

    /// Typed request: serialize `params`, decode the response payload as `R`.
    ///
    /// Params serializing to `null` are omitted from the envelope.
    pub async fn call<P, R>(&self, method: &str, params: &P) -> BridgeResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = match serde_json::to_value(params)? {
            Value::Null => None,
            value => Some(value),
        };
        let payload = self.send(method, params).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Is `method` usable in this bridge's context?
    pub fn supports(&self, method: &str) -> bool {
        self.capabilities.supports(method)
    }

    /// Observe every inbound envelope, responses included.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&InboundEnvelope) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(Arc::new(listener))
    }

    /// Observe host push events only.
    pub fn subscribe_events<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(BridgeEvent) + Send + Sync + 'static,
    {
        self.subscribe(move |envelope: &InboundEnvelope| {
            if let EnvelopeKind::Event(event) = envelope.kind() {
                listener(event);
            }
        })
    }

    /// Stop a listener. Unknown ids are a no-op returning false.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        if id == self.settle_listener {
            return false;
        }
        self.dispatcher.unsubscribe(id)
    }

    /// Requests currently awaiting a response
    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    pub fn stats(&self) -> BridgeStats {
        let dispatch = self.dispatcher.stats();
        BridgeStats {
            requests: self.registry.stats().snapshot(),
            pending: self.registry.pending_count(),
            dispatched: dispatch.total_dispatched.load(Ordering::Relaxed),
            listener_panics: dispatch.total_listener_panics.load(Ordering::Relaxed),
            listeners: self.dispatcher.listener_count().saturating_sub(1),
        }
    }

    /// Stop background tasks and cancel every pending request.
    ///
    /// Returns the number of requests cancelled. Later sends fail with
    /// [`BridgeError::ShutDown`].
    pub fn shutdown(&self) -> usize {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return 0;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let cancelled = self.registry.cancel_all();
        info!(bridge_id = %self.id, cancelled = cancelled, "Bridge shut down");
        cancelled
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn effective_timeout(&self, method: &str, policy: TimeoutPolicy) -> Option<Duration> {
        let timeouts = &self.config.timeouts;
        match policy {
            TimeoutPolicy::After(timeout) => Some(timeout),
            TimeoutPolicy::Never => None,
            TimeoutPolicy::Default if !timeouts.enabled => None,
            TimeoutPolicy::Default => {
                let per_method = if timeouts.use_method_timeouts {
                    get_method_timeout(method)
                } else {
                    None
                };
                Some(per_method.unwrap_or(timeouts.default))
            }
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl BridgeApi for Bridge {
    async fn request(&self, method: &str, params: Option<Value>) -> BridgeResult<Value> {
        self.send(method, params).await
    }

    fn supports(&self, method: &str) -> bool {
        Bridge::supports(self, method)
    }

    fn subscribe(&self, listener: Listener) -> ListenerId {
        self.dispatcher.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        Bridge::unsubscribe(self, id)
    }
}

/// Drain the transport's inbound stream into the dispatcher.
async fn pump(bridge_id: Uuid, mut inbound: InboundReceiver, dispatcher: Arc<Dispatcher>) {
    while let Some(envelope) = inbound.recv().await {
        dispatcher.dispatch(&envelope);
    }
    debug!(bridge_id = %bridge_id, "Transport inbound stream closed");
}
