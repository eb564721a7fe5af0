//! Inbound port: what application code depends on.
//!
//! Code that talks to the host should take an `Arc<dyn BridgeApi>` rather than
//! a concrete bridge, so tests and multi-frame setups can inject their own.

use crate::dispatch::{Listener, ListenerId};
use crate::domain::error::BridgeResult;
use async_trait::async_trait;
use serde_json::Value;

/// Public contract of a bridge.
#[async_trait]
pub trait BridgeApi: Send + Sync {
    /// Send a request and wait for its settlement.
    async fn request(&self, method: &str, params: Option<Value>) -> BridgeResult<Value>;

    /// Is `method` usable in the current context?
    fn supports(&self, method: &str) -> bool;

    /// Observe every inbound envelope.
    fn subscribe(&self, listener: Listener) -> ListenerId;

    /// Stop observing. Returns false if the id was not subscribed.
    fn unsubscribe(&self, id: ListenerId) -> bool;
}
