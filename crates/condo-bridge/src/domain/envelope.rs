//! Wire envelopes exchanged across the bridge.
//!
//! Outbound requests have a fixed shape. Inbound traffic is arbitrary JSON
//! from a shared channel: only `requestId`, `errorType` and the `type` /
//! `handler` discriminants carry meaning, everything else is passed through
//! untouched.

use crate::domain::request_id::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `type` discriminant stamped on every outbound request.
pub const BRIDGE_MESSAGE_TYPE: &str = "condo-bridge";

/// Field carrying the correlation token in both directions.
pub const REQUEST_ID_FIELD: &str = "requestId";

/// Field whose presence marks an inbound envelope as a failure.
pub const ERROR_TYPE_FIELD: &str = "errorType";

/// Push event sent by the host when a user clicks a registered action.
pub const ACTION_CLICK_EVENT: &str = "CondoWebAppActionClickEvent";

/// Host-initiated content update for preview frames.
pub const HOST_UPDATE_HANDLER: &str = "handleUpdateFromCondo";

/// Request sent from the embedded app to its host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope {
    /// Method name
    pub handler: String,
    /// Method parameters, omitted from the wire when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Correlation token
    pub request_id: RequestId,
    /// Always [`BRIDGE_MESSAGE_TYPE`]
    #[serde(rename = "type")]
    pub message_type: String,
    /// Sender's bridge version (advisory only)
    pub version: String,
}

impl OutboundEnvelope {
    pub fn new(
        handler: impl Into<String>,
        params: Option<Value>,
        request_id: RequestId,
        version: impl Into<String>,
    ) -> Self {
        Self {
            handler: handler.into(),
            params,
            request_id,
            message_type: BRIDGE_MESSAGE_TYPE.to_string(),
            version: version.into(),
        }
    }

    /// Serialize to the JSON value posted on the wire.
    pub fn to_value(&self) -> Value {
        // Plain strings and JSON values only, serialization cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Message received from the counterpart, tagged with the origin it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEnvelope {
    origin: String,
    payload: Value,
}

impl InboundEnvelope {
    pub fn new(origin: impl Into<String>, payload: Value) -> Self {
        Self {
            origin: origin.into(),
            payload,
        }
    }

    /// Origin of the sending context.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The raw payload, exactly as received.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Correlation token, if the payload is an object carrying a usable one.
    pub fn request_id(&self) -> Option<RequestId> {
        self.payload
            .as_object()?
            .get(REQUEST_ID_FIELD)
            .and_then(RequestId::from_json)
    }

    /// Value of the `errorType` field, if present.
    ///
    /// Non-string error types are reported as their JSON text so that the
    /// failure is never silently lost.
    pub fn error_type(&self) -> Option<String> {
        let value = self.payload.as_object()?.get(ERROR_TYPE_FIELD)?;
        Some(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Structural success predicate: success iff there is no `errorType` field.
    pub fn is_success(&self) -> bool {
        self.payload
            .as_object()
            .map_or(true, |map| !map.contains_key(ERROR_TYPE_FIELD))
    }

    /// `type` discriminant, if present and a string.
    pub fn message_type(&self) -> Option<&str> {
        self.payload.as_object()?.get("type")?.as_str()
    }

    /// `handler` discriminant, if present and a string.
    pub fn handler(&self) -> Option<&str> {
        self.payload.as_object()?.get("handler")?.as_str()
    }

    /// Classify the payload into a closed set of message kinds.
    pub fn kind(&self) -> EnvelopeKind {
        if !self.payload.is_object() {
            return EnvelopeKind::Malformed;
        }

        if self.message_type() == Some(BRIDGE_MESSAGE_TYPE) {
            return match (self.handler(), self.request_id()) {
                (Some(handler), Some(request_id)) => EnvelopeKind::Request {
                    handler: handler.to_string(),
                    request_id,
                },
                _ => EnvelopeKind::Malformed,
            };
        }

        if let Some(request_id) = self.request_id() {
            return match self.error_type() {
                Some(error_type) => EnvelopeKind::Failure {
                    request_id,
                    error_type,
                },
                None => EnvelopeKind::Response { request_id },
            };
        }

        match BridgeEvent::from_envelope(self) {
            Some(event) => EnvelopeKind::Event(event),
            None => EnvelopeKind::Malformed,
        }
    }
}

/// Closed classification of inbound traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeKind {
    /// Successful response to one of our requests
    Response { request_id: RequestId },
    /// Failed response to one of our requests
    Failure {
        request_id: RequestId,
        error_type: String,
    },
    /// A bridge request from a peer (or an echo of our own); never a response
    Request {
        handler: String,
        request_id: RequestId,
    },
    /// Unsolicited push event
    Event(BridgeEvent),
    /// Not an object, or an object this protocol cannot interpret
    Malformed,
}

impl EnvelopeKind {
    /// Request id this envelope settles, if it is a response of either kind.
    pub fn settles(&self) -> Option<&RequestId> {
        match self {
            Self::Response { request_id } | Self::Failure { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

/// Host-initiated events that are not responses to any request.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// User clicked an action registered by the mini-app
    ActionClick { action_id: String },
    /// Host pushed new preview content
    HostUpdate {
        title: Option<String>,
        body: Option<String>,
    },
    /// Any other typed event, passed through as-is
    Other { event_type: String, payload: Value },
}

impl BridgeEvent {
    /// Interpret an uncorrelated envelope as a push event.
    pub fn from_envelope(envelope: &InboundEnvelope) -> Option<Self> {
        let map = envelope.payload().as_object()?;

        if envelope.handler() == Some(HOST_UPDATE_HANDLER) {
            let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
            return Some(Self::HostUpdate {
                title: text("title"),
                body: text("body"),
            });
        }

        let event_type = envelope.message_type()?;
        if event_type == ACTION_CLICK_EVENT {
            let action_id = map
                .get("data")
                .and_then(|data| data.get("actionId"))
                .or_else(|| map.get("actionId"))
                .and_then(Value::as_str);
            if let Some(action_id) = action_id {
                return Some(Self::ActionClick {
                    action_id: action_id.to_string(),
                });
            }
        }

        Some(Self::Other {
            event_type: event_type.to_string(),
            payload: envelope.payload().clone(),
        })
    }
}
