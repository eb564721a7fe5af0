//! Condo Bridge - request/response RPC between an embedded mini-app and its host.
//!
//! The host and the mini-app live in separate execution contexts that can
//! only exchange asynchronous, unacknowledged messages over a shared channel.
//! This crate layers correlated requests, capability discovery and event
//! subscription on top of that channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          CONDO BRIDGE                                │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   send / call / supports / subscribe / unsubscribe                   │
//! │                        │                                             │
//! │  ┌─────────────────────┴────────────────────┐   ┌──────────────────┐ │
//! │  │                Bridge                    │──▶│ Capability Table │ │
//! │  └──────┬───────────────────────────▲───────┘   └──────────────────┘ │
//! │         │ register            settle│                                │
//! │  ┌──────▼───────────────────┐  ┌────┴─────────────────────────────┐  │
//! │  │  Correlation Registry    │  │  Dispatcher (ordered listeners)  │  │
//! │  │  (oneshot per request)   │  │  settle listener + app listeners │  │
//! │  └──────────────────────────┘  └────▲─────────────────────────────┘  │
//! │         │ post                      │ pump task                      │
//! │  ┌──────▼───────────────────────────┴─────────────────────────────┐  │
//! │  │      Transport (channel / detached / NDJSON stream)            │  │
//! │  └──────────────────────────────┬─────────────────────────────────┘  │
//! └─────────────────────────────────┼────────────────────────────────────┘
//!                                   │
//!                               Host frame
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use condo_bridge::{Bridge, BridgeConfig};
//! use condo_bridge::domain::config::OriginConfig;
//!
//! // Origins have no default; set them here or via CONDO_BRIDGE_* variables
//! let mut config = BridgeConfig::from_env();
//! config.origins = OriginConfig::exact("https://condo.example");
//! let (bridge, host) = Bridge::with_counterpart(config, "https://condo.example")?;
//! if bridge.supports("CondoWebAppShowNotification") {
//!     bridge
//!         .send("CondoWebAppShowNotification", Some(json!({"type": "info", "message": "Hi"})))
//!         .await?;
//! }
//! ```
//!
//! # Guarantees
//!
//! - Each request settles exactly once: response, remote error, timeout or cancellation
//! - Duplicate responses are ignored
//! - Listeners are called in subscription order; one panicking does not stop the rest
//! - Inbound messages from origins outside the allow-list never reach listeners

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod dispatch;
pub mod domain;
pub mod ports;
pub mod response;
pub mod service;

// Re-exports for public API
pub use adapters::{ChannelTransport, Counterpart, DetachedTransport, StreamTransport};
pub use dispatch::{DispatchReport, Dispatcher, Listener, ListenerId};
pub use domain::config::BridgeConfig;
pub use domain::envelope::{BridgeEvent, EnvelopeKind, InboundEnvelope, OutboundEnvelope};
pub use domain::error::{BridgeError, BridgeResult, RemoteError, TransportError};
pub use domain::methods::{is_method_supported, CapabilityTable, RuntimeContext};
pub use domain::origin::OriginPolicy;
pub use domain::request_id::RequestId;
pub use ports::{BridgeApi, Delivery, Transport};
pub use response::PendingResponse;
pub use service::{Bridge, BridgeStats, SendOptions, TimeoutPolicy};

/// Crate version, stamped on every outbound envelope
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version string reported in logs
pub fn bridge_version() -> String {
    format!("condo-bridge/v{}", VERSION)
}
