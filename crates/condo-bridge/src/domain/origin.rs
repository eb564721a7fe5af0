//! Origin policy for cross-context delivery.
//!
//! Outbound envelopes go to one expected counterpart origin; inbound messages
//! are admitted only from allow-listed origins. Wildcards exist but must be
//! asked for explicitly.

use crate::domain::config::OriginConfig;
use std::collections::HashSet;

/// Wildcard accepted in configuration for "any origin".
pub const ANY_ORIGIN: &str = "*";

/// Where outbound envelopes may be delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    /// Deliver regardless of the counterpart's origin
    Any,
    /// Deliver only if the counterpart's origin matches exactly
    Exact(String),
}

impl TargetOrigin {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s == ANY_ORIGIN {
            Self::Any
        } else {
            Self::Exact(normalize(s))
        }
    }

    /// Does a counterpart at `origin` qualify as the target?
    pub fn matches(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => *expected == normalize(origin),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Any)
    }
}

/// Which inbound origins are trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(HashSet<String>),
}

impl AllowedOrigins {
    pub fn admits(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.contains(&normalize(origin)),
        }
    }
}

/// Origin policy threaded through every transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    target: TargetOrigin,
    allowed: AllowedOrigins,
}

impl OriginPolicy {
    /// Talk to exactly one counterpart origin, in both directions.
    pub fn exact(origin: &str) -> Self {
        let origin = normalize(origin);
        Self {
            target: TargetOrigin::Exact(origin.clone()),
            allowed: AllowedOrigins::List(HashSet::from([origin])),
        }
    }

    /// Target one origin, accept inbound traffic from a list of origins.
    pub fn new<I, S>(target: TargetOrigin, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut any = false;
        let mut origins = HashSet::new();
        for origin in allowed {
            let origin = origin.as_ref().trim();
            if origin == ANY_ORIGIN {
                any = true;
            } else {
                origins.insert(normalize(origin));
            }
        }
        let allowed = if any {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        };
        Self { target, allowed }
    }

    /// Wildcard in both directions. Only for tests and trusted local pipes.
    pub fn permissive() -> Self {
        Self {
            target: TargetOrigin::Any,
            allowed: AllowedOrigins::Any,
        }
    }

    pub fn from_config(config: &OriginConfig) -> Self {
        Self::new(
            TargetOrigin::parse(&config.target_origin),
            &config.allowed_origins,
        )
    }

    pub fn target(&self) -> &TargetOrigin {
        &self.target
    }

    /// Should an inbound message from `origin` be trusted?
    pub fn admits(&self, origin: &str) -> bool {
        self.allowed.admits(origin)
    }

    pub fn is_permissive(&self) -> bool {
        self.target.is_wildcard() || matches!(self.allowed, AllowedOrigins::Any)
    }
}

/// Origins compare case-insensitively and without a trailing slash.
fn normalize(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}
