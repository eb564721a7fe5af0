//! Request identifiers used to correlate responses with outgoing requests.
//!
//! Generated ids come from a per-bridge monotonic counter starting at 1.
//! Callers may also supply their own id (number or string) for flows that are
//! pre-correlated on the host side.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Correlation token linking an outbound request to its inbound response.
///
/// Serialized as a bare JSON number or string, matching what the counterpart
/// echoes back in `requestId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Machine-generated or caller-supplied numeric id
    Number(u64),
    /// Caller-supplied string id
    Text(String),
}

impl RequestId {
    /// Extract a request id from a raw `requestId` JSON value.
    ///
    /// Accepts non-negative integers (including integral floats such as `3.0`,
    /// which some hosts produce) and strings. Anything else yields `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    return Some(Self::Number(v));
                }
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f >= 0.0 && f <= u64::MAX as f64 {
                    Some(Self::Number(f as u64))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Numeric value, if this is a numeric id.
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Monotonic id generator owned by a single correlation registry.
#[derive(Debug)]
pub struct RequestIdCounter {
    next: AtomicU64,
}

impl RequestIdCounter {
    /// Counter whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Take the next id.
    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Peek at the id the next call would return (for diagnostics).
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for RequestIdCounter {
    fn default() -> Self {
        Self::new()
    }
}
