//! In-process channel transport.
//!
//! Models a frame and its parent as two ends of a channel pair. The bridge
//! owns the [`ChannelTransport`]; the other end is a [`Counterpart`] that sees
//! every posted request and can answer or push events, always stamped with
//! its own origin (or a chosen one, to model other frames sharing the window).

use super::{inbound_channel, InboundSink, InboundSlot};
use crate::domain::envelope::{InboundEnvelope, OutboundEnvelope, ERROR_TYPE_FIELD, REQUEST_ID_FIELD};
use crate::domain::error::TransportError;
use crate::domain::origin::OriginPolicy;
use crate::ports::outbound::{Delivery, InboundReceiver, Transport};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::debug;

/// Bridge-side end of an in-process channel pair.
pub struct ChannelTransport {
    policy: OriginPolicy,
    counterpart_origin: String,
    outbound: mpsc::UnboundedSender<OutboundEnvelope>,
    inbound: InboundSlot,
}

impl ChannelTransport {
    /// Create a transport and its counterpart living at `counterpart_origin`.
    pub fn pair(policy: OriginPolicy, counterpart_origin: impl Into<String>) -> (Self, Counterpart) {
        let counterpart_origin = counterpart_origin.into();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (sink, slot) = inbound_channel(policy.clone());

        let transport = Self {
            policy,
            counterpart_origin: counterpart_origin.clone(),
            outbound: outbound_tx,
            inbound: slot,
        };
        let counterpart = Counterpart {
            origin: counterpart_origin,
            requests: outbound_rx,
            sink,
        };
        (transport, counterpart)
    }
}

impl Transport for ChannelTransport {
    fn post(&self, envelope: &OutboundEnvelope) -> Result<Delivery, TransportError> {
        if !self.policy.target().matches(&self.counterpart_origin) {
            debug!(
                request_id = %envelope.request_id,
                counterpart_origin = %self.counterpart_origin,
                "Target origin mismatch, envelope not delivered"
            );
            return Ok(Delivery::NoCounterpart);
        }

        match self.outbound.send(envelope.clone()) {
            Ok(()) => Ok(Delivery::Posted),
            Err(_) => {
                debug!(request_id = %envelope.request_id, "Counterpart gone, envelope dropped");
                Ok(Delivery::NoCounterpart)
            }
        }
    }

    fn take_inbound(&self) -> Result<InboundReceiver, TransportError> {
        self.inbound.take()
    }

    fn origin_policy(&self) -> &OriginPolicy {
        &self.policy
    }
}

/// The far end of a [`ChannelTransport`]: a scriptable host.
pub struct Counterpart {
    origin: String,
    requests: mpsc::UnboundedReceiver<OutboundEnvelope>,
    sink: InboundSink,
}

impl Counterpart {
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Next request posted by the bridge; `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<OutboundEnvelope> {
        self.requests.recv().await
    }

    /// Next request if one is already queued.
    pub fn try_recv(&mut self) -> Option<OutboundEnvelope> {
        self.requests.try_recv().ok()
    }

    /// Post an arbitrary payload from this counterpart's origin.
    ///
    /// Returns false if the bridge side dropped it (origin not allowed or no
    /// listener).
    pub fn post(&self, payload: Value) -> bool {
        self.post_from(&self.origin, payload)
    }

    /// Post an arbitrary payload claiming a different origin.
    pub fn post_from(&self, origin: &str, payload: Value) -> bool {
        self.sink.deliver(InboundEnvelope::new(origin, payload))
    }

    /// Answer `request` successfully with `fields`.
    ///
    /// Object fields are merged next to `requestId`; any other value is sent
    /// under `data`.
    pub fn reply(&self, request: &OutboundEnvelope, fields: Value) -> bool {
        self.post(response_payload(request, fields, None))
    }

    /// Answer `request` with a failure of `error_type`.
    pub fn reply_error(&self, request: &OutboundEnvelope, error_type: &str, fields: Value) -> bool {
        self.post(response_payload(request, fields, Some(error_type)))
    }
}

fn response_payload(request: &OutboundEnvelope, fields: Value, error_type: Option<&str>) -> Value {
    let mut map = match fields {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    map.insert(
        REQUEST_ID_FIELD.to_string(),
        serde_json::to_value(&request.request_id).unwrap_or(Value::Null),
    );
    if let Some(error_type) = error_type {
        map.insert(ERROR_TYPE_FIELD.to_string(), Value::String(error_type.to_string()));
    }
    Value::Object(map)
}
