//! Outbound port: the raw cross-context messaging primitive.

use crate::domain::envelope::{InboundEnvelope, OutboundEnvelope};
use crate::domain::error::TransportError;
use crate::domain::origin::OriginPolicy;
use tokio::sync::mpsc;

/// Stream of inbound envelopes surfaced by a transport.
pub type InboundReceiver = mpsc::UnboundedReceiver<InboundEnvelope>;

/// Result of a fire-and-forget post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the counterpart's channel (no acknowledgement implied)
    Posted,
    /// No counterpart to deliver to; the envelope was dropped silently
    NoCounterpart,
}

/// Cross-context messaging primitive.
///
/// Implementations must:
/// - never block in `post`
/// - preserve FIFO order between this sender and its counterpart
/// - hand out the inbound stream exactly once
/// - drop inbound messages whose origin the policy does not admit
pub trait Transport: Send + Sync {
    /// Deliver an envelope to the counterpart, fire-and-forget.
    fn post(&self, envelope: &OutboundEnvelope) -> Result<Delivery, TransportError>;

    /// Take the single inbound listener for this transport.
    fn take_inbound(&self) -> Result<InboundReceiver, TransportError>;

    /// Origin policy this transport was built with.
    fn origin_policy(&self) -> &OriginPolicy;
}
