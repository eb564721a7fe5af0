//! Bridge error types.
//!
//! Every protocol-level failure reaches the caller that issued the request.
//! Malformed inbound traffic is never an error; it is logged and dropped.

use crate::domain::config::ConfigError;
use crate::domain::request_id::RequestId;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Failure reported by the counterpart (inbound envelope with `errorType`).
///
/// Keeps the complete envelope so nothing the host sent is lost.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    /// Value of `errorType`
    pub error_type: String,
    /// The full inbound envelope
    pub envelope: Value,
}

impl RemoteError {
    pub fn new(error_type: impl Into<String>, envelope: Value) -> Self {
        Self {
            error_type: error_type.into(),
            envelope,
        }
    }

    /// Convenience accessor for a string field of the envelope.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.envelope.get(key).and_then(Value::as_str)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field("errorMessage").or_else(|| self.field("message")) {
            Some(message) => write!(f, "{}: {}", self.error_type, message),
            None => f.write_str(&self.error_type),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Errors surfaced by the bridge facade.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Method is not usable in the current context (strict mode only)
    #[error("method not supported in this context: {method}")]
    MethodNotSupported { method: String },

    /// Caller-supplied request id is already held by a pending request
    #[error("request id already pending: {0}")]
    DuplicateRequestId(RequestId),

    /// Counterpart answered with an error envelope
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// No response within the request's deadline
    #[error("request {request_id} ({method}) timed out after {}ms", .after.as_millis())]
    Timeout {
        method: String,
        request_id: RequestId,
        after: Duration,
    },

    /// Request was evicted or the bridge shut down before a response arrived
    #[error("request {request_id} cancelled")]
    Cancelled { request_id: RequestId },

    /// Transport refused the outbound envelope
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Response could not be decoded into the requested type
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Request issued after `shutdown`
    #[error("bridge has been shut down")]
    ShutDown,

    /// Bridge constructed outside a Tokio runtime
    #[error("no Tokio runtime available to run the bridge")]
    NoRuntime,
}

impl BridgeError {
    /// Request id the error relates to, when there is one.
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::DuplicateRequestId(id)
            | Self::Timeout { request_id: id, .. }
            | Self::Cancelled { request_id: id } => Some(id),
            _ => None,
        }
    }

    /// The raw error envelope, for remote failures.
    pub fn remote_envelope(&self) -> Option<&Value> {
        match self {
            Self::Remote(remote) => Some(&remote.envelope),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Transport adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Outbound envelope could not be encoded for the wire
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Underlying writer failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Inbound listener was already taken
    #[error("inbound listener already registered")]
    InboundTaken,

    /// Stream transports need a Tokio runtime for their I/O tasks
    #[error("no Tokio runtime available for transport I/O")]
    NoRuntime,
}
