//! Domain types for the bridge.
//!
//! Wire envelopes, identifiers, configuration, errors, the method
//! capability table and the request correlation registry.

pub mod config;
pub mod envelope;
pub mod error;
pub mod methods;
pub mod origin;
pub mod pending;
pub mod request_id;

// Re-exports for convenience
pub use config::{BridgeConfig, MethodsConfig, OriginConfig, TimeoutConfig};
pub use envelope::{BridgeEvent, EnvelopeKind, InboundEnvelope, OutboundEnvelope};
pub use error::{BridgeError, BridgeResult, RemoteError, TransportError};
pub use methods::{
    get_method_info, get_method_timeout, is_method_supported, CapabilityTable, MethodInfo,
    RuntimeContext,
};
pub use origin::{OriginPolicy, TargetOrigin};
pub use pending::{CorrelationRegistry, PendingStatsSnapshot};
pub use request_id::RequestId;
