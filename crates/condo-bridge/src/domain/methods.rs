//! Method capability table.
//!
//! Static registry of bridge methods partitioned by where they can be served:
//!
//! - **Everywhere**: answered by any host, including native clients
//! - **HostOnly**: need a browser host page (windowing, modals, progress bars)
//!
//! Capability discovery is a local lookup, never a round-trip to the host.

use crate::domain::config::MethodsConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

/// Execution context the bridge runs in, fixed at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeContext {
    /// Embedded in a browser host page
    Host,
    /// Not embedded (standalone page, server-side, native shell)
    #[default]
    Detached,
}

impl RuntimeContext {
    /// Parse `host` / `detached` (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" | "browser" => Some(Self::Host),
            "detached" | "standalone" | "none" => Some(Self::Detached),
            _ => None,
        }
    }
}

/// Where a method can be served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Availability {
    /// Any context
    Everywhere,
    /// Only when running inside a browser host
    HostOnly,
}

impl Availability {
    /// Check if this availability admits the given context
    pub fn admits(&self, context: RuntimeContext) -> bool {
        match self {
            Availability::Everywhere => true,
            Availability::HostOnly => context == RuntimeContext::Host,
        }
    }
}

/// Method category for grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodCategory {
    Launch,
    Notification,
    Navigation,
    Window,
    Modal,
    ProgressBar,
    Actions,
}

/// Method metadata
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// Full method name (e.g., "CondoWebAppShowNotification")
    pub name: &'static str,
    /// Where the method can be served
    pub availability: Availability,
    /// Category
    pub category: MethodCategory,
    /// Recommended response timeout
    pub timeout: Duration,
    /// Brief description
    pub description: &'static str,
}

impl MethodInfo {
    const fn everywhere(
        name: &'static str,
        category: MethodCategory,
        timeout_secs: u64,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            availability: Availability::Everywhere,
            category,
            timeout: Duration::from_secs(timeout_secs),
            description,
        }
    }

    const fn host_only(
        name: &'static str,
        category: MethodCategory,
        timeout_secs: u64,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            availability: Availability::HostOnly,
            category,
            timeout: Duration::from_secs(timeout_secs),
            description,
        }
    }
}

/// Method registry - all known methods with metadata
pub static METHOD_REGISTRY: LazyLock<HashMap<&'static str, MethodInfo>> = LazyLock::new(|| {
    let methods = [
        // --- Available everywhere ---
        MethodInfo::everywhere(
            "CondoWebAppGetLaunchParams",
            MethodCategory::Launch,
            10,
            "Returns launch context (user, organization, locale)",
        ),
        MethodInfo::everywhere(
            "CondoWebAppShowNotification",
            MethodCategory::Notification,
            10,
            "Shows a toast notification in the host UI",
        ),
        MethodInfo::everywhere(
            "CondoWebAppRequestAuth",
            MethodCategory::Launch,
            60,
            "Performs an authenticated request on behalf of the app",
        ),
        MethodInfo::everywhere(
            "CondoWebAppRedirect",
            MethodCategory::Navigation,
            10,
            "Navigates the host to another page",
        ),
        // --- Browser host only ---
        MethodInfo::host_only(
            "CondoWebAppResizeWindow",
            MethodCategory::Window,
            5,
            "Resizes the embedding frame",
        ),
        MethodInfo::host_only(
            "CondoWebAppGetFragment",
            MethodCategory::Navigation,
            5,
            "Returns the host URL fragment",
        ),
        MethodInfo::host_only(
            "CondoWebAppShowModalWindow",
            MethodCategory::Modal,
            10,
            "Opens a host modal rendering a mini-app URL",
        ),
        MethodInfo::host_only(
            "CondoWebAppUpdateModalWindow",
            MethodCategory::Modal,
            10,
            "Updates title or size of an open modal",
        ),
        MethodInfo::host_only(
            "CondoWebAppCloseModalWindow",
            MethodCategory::Modal,
            10,
            "Closes a modal opened by the app",
        ),
        MethodInfo::host_only(
            "CondoWebAppShowProgressBar",
            MethodCategory::ProgressBar,
            10,
            "Shows a background-task progress bar",
        ),
        MethodInfo::host_only(
            "CondoWebAppUpdateProgressBar",
            MethodCategory::ProgressBar,
            10,
            "Updates progress or status of a progress bar",
        ),
        MethodInfo::host_only(
            "CondoWebAppGetActiveProgressBars",
            MethodCategory::ProgressBar,
            10,
            "Lists progress bars owned by the app",
        ),
        MethodInfo::host_only(
            "CondoWebAppSetActionsConfig",
            MethodCategory::Actions,
            10,
            "Configures host action buttons (clicks arrive as push events)",
        ),
    ];

    methods.into_iter().map(|m| (m.name, m)).collect()
});

/// Get method info by name
pub fn get_method_info(method: &str) -> Option<&'static MethodInfo> {
    METHOD_REGISTRY.get(method)
}

/// Check if a method is supported in the given context (static registry only)
pub fn is_method_supported(method: &str, context: RuntimeContext) -> bool {
    get_method_info(method).is_some_and(|info| info.availability.admits(context))
}

/// Get recommended timeout for a method, if it is a known method
pub fn get_method_timeout(method: &str) -> Option<Duration> {
    get_method_info(method).map(|info| info.timeout)
}

/// Capability table resolved once for a bridge instance.
///
/// Combines the static registry with configured extra and disabled methods.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    context: RuntimeContext,
    supported: HashSet<String>,
}

impl CapabilityTable {
    /// Resolve the table for a context and methods configuration.
    pub fn new(context: RuntimeContext, config: &MethodsConfig) -> Self {
        let mut supported: HashSet<String> = METHOD_REGISTRY
            .values()
            .filter(|info| info.availability.admits(context))
            .map(|info| info.name.to_string())
            .collect();

        supported.extend(config.extra_methods.iter().cloned());
        for disabled in &config.disabled_methods {
            supported.remove(disabled);
        }

        Self { context, supported }
    }

    /// Is `method` usable in this context?
    pub fn supports(&self, method: &str) -> bool {
        self.supported.contains(method)
    }

    pub fn context(&self) -> RuntimeContext {
        self.context
    }

    /// Supported method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.supported.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
