//! Ports for the bridge.
//!
//! - `inbound`: the API the embedded application drives
//! - `outbound`: the transport the bridge drives

pub mod inbound;
pub mod outbound;

pub use inbound::BridgeApi;
pub use outbound::{Delivery, InboundReceiver, Transport};
