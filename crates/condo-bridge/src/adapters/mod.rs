//! Transport adapters.
//!
//! - `channel`: in-process channel pair with a scriptable counterpart
//! - `detached`: no counterpart at all (graceful no-op)
//! - `stream`: newline-delimited JSON over async byte streams

pub mod channel;
pub mod detached;
pub mod stream;

pub use channel::{ChannelTransport, Counterpart};
pub use detached::DetachedTransport;
pub use stream::StreamTransport;

use crate::domain::envelope::InboundEnvelope;
use crate::domain::error::TransportError;
use crate::domain::origin::OriginPolicy;
use crate::ports::outbound::InboundReceiver;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Producing side of a transport's inbound stream, with origin filtering.
#[derive(Clone)]
pub(crate) struct InboundSink {
    tx: mpsc::UnboundedSender<InboundEnvelope>,
    policy: OriginPolicy,
}

impl InboundSink {
    /// Forward an envelope if its origin is admitted.
    ///
    /// Returns true if the envelope was queued for dispatch.
    pub(crate) fn deliver(&self, envelope: InboundEnvelope) -> bool {
        if !self.policy.admits(envelope.origin()) {
            debug!(
                origin = envelope.origin(),
                "Dropping inbound message from origin outside allow-list"
            );
            return false;
        }
        if self.tx.send(envelope).is_err() {
            trace!("Inbound listener gone, dropping message");
            return false;
        }
        true
    }
}

/// Inbound receiver that can be taken exactly once.
pub(crate) struct InboundSlot {
    rx: Mutex<Option<InboundReceiver>>,
}

impl InboundSlot {
    pub(crate) fn new(rx: InboundReceiver) -> Self {
        Self {
            rx: Mutex::new(Some(rx)),
        }
    }

    pub(crate) fn take(&self) -> Result<InboundReceiver, TransportError> {
        self.rx.lock().take().ok_or(TransportError::InboundTaken)
    }
}

/// Create a filtered inbound channel: the sink for producers, the slot for the bridge.
pub(crate) fn inbound_channel(policy: OriginPolicy) -> (InboundSink, InboundSlot) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboundSink { tx, policy }, InboundSlot::new(rx))
}
