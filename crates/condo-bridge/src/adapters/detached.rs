//! Transport for a page running outside any host frame.
//!
//! Posting is a silent no-op and nothing ever arrives, so every request
//! waits for its deadline (or forever, with no deadline).

use super::InboundSlot;
use crate::domain::envelope::OutboundEnvelope;
use crate::domain::error::TransportError;
use crate::domain::origin::OriginPolicy;
use crate::ports::outbound::{Delivery, InboundReceiver, Transport};
use tokio::sync::mpsc;
use tracing::trace;

pub struct DetachedTransport {
    policy: OriginPolicy,
    inbound: InboundSlot,
}

impl DetachedTransport {
    pub fn new(policy: OriginPolicy) -> Self {
        // Sender dropped at once: the inbound stream ends immediately
        let (_tx, rx) = mpsc::unbounded_channel();
        Self {
            policy,
            inbound: InboundSlot::new(rx),
        }
    }
}

impl Default for DetachedTransport {
    fn default() -> Self {
        Self::new(OriginPolicy::permissive())
    }
}

impl Transport for DetachedTransport {
    fn post(&self, envelope: &OutboundEnvelope) -> Result<Delivery, TransportError> {
        trace!(
            request_id = %envelope.request_id,
            handler = %envelope.handler,
            "No host frame, dropping outbound envelope"
        );
        Ok(Delivery::NoCounterpart)
    }

    fn take_inbound(&self) -> Result<InboundReceiver, TransportError> {
        self.inbound.take()
    }

    fn origin_policy(&self) -> &OriginPolicy {
        &self.policy
    }
}
