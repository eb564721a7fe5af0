//! Bridge configuration with validation.
//!
//! Every section deserializes with defaults so partial documents work.
//! Durations accept `"30s"`, `"500ms"`, `"2m"` or plain seconds.

use crate::domain::methods::RuntimeContext;
use crate::domain::origin::ANY_ORIGIN;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

/// Environment variable selecting the runtime context (`host` / `detached`)
pub const ENV_CONTEXT: &str = "CONDO_BRIDGE_CONTEXT";
/// Environment variable for the outbound target origin
pub const ENV_TARGET_ORIGIN: &str = "CONDO_BRIDGE_TARGET_ORIGIN";
/// Environment variable for the comma-separated inbound allow-list
pub const ENV_ALLOWED_ORIGINS: &str = "CONDO_BRIDGE_ALLOWED_ORIGINS";
/// Environment variable for the default request timeout in milliseconds
pub const ENV_TIMEOUT_MS: &str = "CONDO_BRIDGE_TIMEOUT_MS";
/// Environment variable enabling strict method checks
pub const ENV_STRICT_METHODS: &str = "CONDO_BRIDGE_STRICT_METHODS";

/// Main bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Execution context, fixed for the bridge's lifetime
    pub context: RuntimeContext,
    /// Origin policy
    pub origins: OriginConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Method capability configuration
    pub methods: MethodsConfig,
}

impl BridgeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.origins.target_origin.trim().is_empty() {
            return Err(ConfigError::InvalidOrigin(
                "target_origin must be set (use \"*\" to allow any)".into(),
            ));
        }

        if self.origins.allowed_origins.is_empty() {
            return Err(ConfigError::InvalidOrigin(
                "allowed_origins must be set (use [\"*\"] to allow any)".into(),
            ));
        }

        if let Some(blank) = self
            .origins
            .allowed_origins
            .iter()
            .find(|o| o.trim().is_empty())
        {
            return Err(ConfigError::InvalidOrigin(format!(
                "blank entry in allowed_origins: {:?}",
                blank
            )));
        }

        if self.timeouts.default.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "default timeout cannot be 0".into(),
            ));
        }

        if self.timeouts.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "sweep_interval cannot be 0".into(),
            ));
        }

        let extra: HashSet<_> = self.methods.extra_methods.iter().collect();
        if let Some(both) = self
            .methods
            .disabled_methods
            .iter()
            .find(|m| extra.contains(m))
        {
            return Err(ConfigError::InvalidMethods(format!(
                "{} is both extra and disabled",
                both
            )));
        }

        if self.origins.is_wildcard() {
            warn!(
                target_origin = %self.origins.target_origin,
                allowed_origins = ?self.origins.allowed_origins,
                "Bridge configured with wildcard origin; messages are not origin-restricted"
            );
        }

        Ok(())
    }

    /// Default configuration overlaid with `CONDO_BRIDGE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Default configuration overlaid with values from `lookup`.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup(ENV_CONTEXT) {
            match RuntimeContext::parse(&val) {
                Some(context) => config.context = context,
                None => warn!(value = %val, "Ignoring invalid {}", ENV_CONTEXT),
            }
        }

        if let Some(val) = lookup(ENV_TARGET_ORIGIN) {
            config.origins.target_origin = val.trim().to_string();
        }

        if let Some(val) = lookup(ENV_ALLOWED_ORIGINS) {
            config.origins.allowed_origins = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(val) = lookup(ENV_TIMEOUT_MS) {
            match val.trim().parse::<u64>() {
                Ok(ms) => config.timeouts.default = Duration::from_millis(ms),
                Err(_) => warn!(value = %val, "Ignoring invalid {}", ENV_TIMEOUT_MS),
            }
        }

        if let Some(val) = lookup(ENV_STRICT_METHODS) {
            config.methods.reject_unsupported = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }
}

/// Origin configuration
///
/// Empty by default: a bridge will not start until both directions are set,
/// either to concrete origins or to an explicit `"*"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Origin outbound envelopes are addressed to (`"*"` for any)
    pub target_origin: String,
    /// Origins inbound messages are accepted from (`"*"` for any)
    pub allowed_origins: Vec<String>,
}

impl OriginConfig {
    /// Talk to `origin` only, in both directions.
    pub fn exact(origin: impl Into<String>) -> Self {
        let origin = origin.into();
        Self {
            target_origin: origin.clone(),
            allowed_origins: vec![origin],
        }
    }

    /// Wildcard in both directions.
    pub fn any() -> Self {
        Self {
            target_origin: ANY_ORIGIN.to_string(),
            allowed_origins: vec![ANY_ORIGIN.to_string()],
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.target_origin.trim() == ANY_ORIGIN
            || self.allowed_origins.iter().any(|o| o.trim() == ANY_ORIGIN)
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Apply deadlines to requests at all
    pub enabled: bool,
    /// Deadline for methods without a registry timeout
    #[serde(with = "humantime_serde")]
    pub default: Duration,
    /// Prefer the per-method timeout from the method registry
    pub use_method_timeouts: bool,
    /// How often expired pending requests are swept
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default: Duration::from_secs(30),
            use_method_timeouts: true,
            sweep_interval: Duration::from_secs(5),
        }
    }
}

/// Method capability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodsConfig {
    /// Reject unsupported methods in `send` instead of posting them
    pub reject_unsupported: bool,
    /// Additional methods to treat as supported (not in the registry)
    pub extra_methods: Vec<String>,
    /// Methods to treat as unsupported even if the registry lists them
    pub disabled_methods: Vec<String>,
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid origin configuration
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Conflicting method lists
    #[error("invalid methods: {0}")]
    InvalidMethods(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            // Sub-millisecond precision is not representable; round up so a
            // non-zero duration never reads back as zero
            let millis = duration.as_nanos().div_ceil(1_000_000);
            serializer.serialize_str(&format!("{}ms", millis))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
