//! Shared fixtures for the integration tests.

use condo_bridge::domain::config::OriginConfig;
use condo_bridge::{Bridge, BridgeConfig, Counterpart, OutboundEnvelope, RuntimeContext};
use serde_json::Value;
use std::sync::Once;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Origin the scripted host lives at
pub const HOST_ORIGIN: &str = "https://condo.example";

/// Origin of some other frame sharing the window
pub const FOREIGN_ORIGIN: &str = "https://ads.example";

/// How long a test waits for the host to see a request
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once, honouring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Config for a bridge embedded in a host page that only trusts [`HOST_ORIGIN`].
pub fn host_config() -> BridgeConfig {
    BridgeConfig {
        context: RuntimeContext::Host,
        origins: OriginConfig::exact(HOST_ORIGIN),
        ..Default::default()
    }
}

/// Config that accepts any origin in both directions.
pub fn permissive_config() -> BridgeConfig {
    BridgeConfig {
        origins: OriginConfig::any(),
        ..Default::default()
    }
}

/// Bridge plus a scripted host at [`HOST_ORIGIN`].
pub fn bridge_with_host(config: BridgeConfig) -> (Bridge, TestHost) {
    init_tracing();
    let (bridge, counterpart) =
        Bridge::with_counterpart(config, HOST_ORIGIN).expect("bridge should start");
    (bridge, TestHost::new(counterpart))
}

/// Scripted host frame.
pub struct TestHost {
    counterpart: Counterpart,
}

impl TestHost {
    pub fn new(counterpart: Counterpart) -> Self {
        Self { counterpart }
    }

    /// Wait for the next request, failing the test if none arrives.
    pub async fn next_request(&mut self) -> OutboundEnvelope {
        tokio::time::timeout(RECV_TIMEOUT, self.counterpart.recv())
            .await
            .expect("timed out waiting for a request")
            .expect("bridge transport closed")
    }

    /// Wait for `n` requests, in posting order.
    pub async fn next_requests(&mut self, n: usize) -> Vec<OutboundEnvelope> {
        let mut requests = Vec::with_capacity(n);
        for _ in 0..n {
            requests.push(self.next_request().await);
        }
        requests
    }

    pub fn try_next_request(&mut self) -> Option<OutboundEnvelope> {
        self.counterpart.try_recv()
    }

    pub fn reply(&self, request: &OutboundEnvelope, fields: Value) -> bool {
        self.counterpart.reply(request, fields)
    }

    pub fn reply_error(&self, request: &OutboundEnvelope, error_type: &str, fields: Value) -> bool {
        self.counterpart.reply_error(request, error_type, fields)
    }

    /// Push an arbitrary payload from the host origin.
    pub fn post(&self, payload: Value) -> bool {
        self.counterpart.post(payload)
    }

    /// Push an arbitrary payload from another origin.
    pub fn post_from(&self, origin: &str, payload: Value) -> bool {
        self.counterpart.post_from(origin, payload)
    }

    /// Answer every request by echoing its params back.
    pub fn spawn_echo(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(request) = self.counterpart.recv().await {
                let params = request.params.clone().unwrap_or(Value::Null);
                self.counterpart.reply(&request, params);
            }
        })
    }
}

/// Round-trip a ping through the host.
///
/// Inbound traffic is processed in order, so once this returns every
/// message the host posted before it has been dispatched.
pub async fn barrier(bridge: &Bridge, host: &mut TestHost) {
    let response = bridge.send("ping", None);
    let request = host.next_request().await;
    host.reply(&request, Value::Null);
    response.await.expect("barrier ping should resolve");
}
