//! # Transport Flows
//!
//! The bridge behaves the same over every adapter: detached pages degrade
//! gracefully, mismatched targets drop silently, and the NDJSON stream
//! transport carries the same wire format as the in-process channel.

#[cfg(test)]
mod tests {
    use crate::support::{
        bridge_with_host, host_config, init_tracing, permissive_config, HOST_ORIGIN,
    };
    use condo_bridge::domain::config::OriginConfig;
    use condo_bridge::{
        Bridge, BridgeConfig, BridgeError, OriginPolicy, RuntimeContext, SendOptions,
        StreamTransport,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader};

    // =============================================================================
    // DETACHED
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_detached_request_times_out() {
        init_tracing();
        let bridge = Bridge::detached(permissive_config()).unwrap();

        let err = bridge.send("CondoWebAppRequestAuth", None).await.unwrap_err();
        match err {
            BridgeError::Timeout { method, after, .. } => {
                assert_eq!(method, "CondoWebAppRequestAuth");
                assert!(after >= Duration::from_secs(60));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_capabilities_depend_on_context() {
        init_tracing();
        let detached = Bridge::detached(permissive_config()).unwrap();
        let (embedded, _host) = bridge_with_host(host_config());

        for method in ["CondoWebAppGetLaunchParams", "CondoWebAppShowNotification"] {
            assert!(detached.supports(method));
            assert!(embedded.supports(method));
        }
        for method in ["CondoWebAppResizeWindow", "CondoWebAppShowModalWindow"] {
            assert!(!detached.supports(method));
            assert!(embedded.supports(method));
        }
        assert!(!embedded.supports("NoSuchMethod"));
        assert_eq!(detached.context(), RuntimeContext::Detached);
        assert_eq!(embedded.context(), RuntimeContext::Host);
    }

    #[tokio::test]
    async fn test_configured_method_overrides() {
        let mut config = host_config();
        config.methods.extra_methods = vec!["CondoWebAppCustom".to_string()];
        config.methods.disabled_methods = vec!["CondoWebAppResizeWindow".to_string()];
        let (bridge, _host) = bridge_with_host(config);

        assert!(bridge.supports("CondoWebAppCustom"));
        assert!(!bridge.supports("CondoWebAppResizeWindow"));
    }

    // =============================================================================
    // TARGET ORIGIN
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_target_mismatch_is_silent() {
        let config = BridgeConfig {
            origins: OriginConfig {
                target_origin: "https://elsewhere.example".to_string(),
                allowed_origins: vec![HOST_ORIGIN.to_string()],
            },
            ..Default::default()
        };
        let (bridge, mut host) = bridge_with_host(config);

        let response = bridge.send_with(
            "echo",
            None,
            SendOptions::default().with_timeout(Duration::from_millis(100)),
        );
        assert!(host.try_next_request().is_none());
        assert!(response.await.unwrap_err().is_timeout());
    }

    // =============================================================================
    // NDJSON STREAM
    // =============================================================================

    #[tokio::test]
    async fn test_stream_transport_round_trip() {
        init_tracing();
        let (local, remote) = duplex(16 * 1024);
        let (local_read, local_write) = split(local);
        let transport = StreamTransport::spawn(
            local_read,
            local_write,
            HOST_ORIGIN,
            OriginPolicy::exact(HOST_ORIGIN),
        )
        .unwrap();
        let bridge = Bridge::new(host_config(), Arc::new(transport)).unwrap();

        // Remote host: answer each request line, after a noise line
        let host = tokio::spawn(async move {
            let (remote_read, mut remote_write) = split(remote);
            let mut lines = BufReader::new(remote_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                let reply = json!({
                    "requestId": request["requestId"],
                    "handler": request["handler"],
                    "echo": request["params"],
                });
                remote_write.write_all(b"not json at all\n").await.unwrap();
                remote_write
                    .write_all(format!("{reply}\n").as_bytes())
                    .await
                    .unwrap();
            }
        });

        let first = bridge.send("CondoWebAppGetFragment", Some(json!({"n": 1})));
        let second = bridge.send("CondoWebAppGetFragment", Some(json!({"n": 2})));

        assert_eq!(first.await.unwrap()["echo"]["n"], 1);
        assert_eq!(second.await.unwrap()["echo"]["n"], 2);
        assert_eq!(bridge.pending_count(), 0);

        bridge.shutdown();
        drop(bridge);
        host.abort();
    }

    #[tokio::test]
    async fn test_stream_remote_error() {
        let (local, remote) = duplex(4096);
        let (local_read, local_write) = split(local);
        let transport =
            StreamTransport::spawn(local_read, local_write, HOST_ORIGIN, OriginPolicy::permissive())
                .unwrap();
        let bridge = Bridge::new(permissive_config(), Arc::new(transport)).unwrap();

        let host = tokio::spawn(async move {
            let (remote_read, mut remote_write) = split(remote);
            let mut lines = BufReader::new(remote_read).lines();
            if let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                let reply = json!({"requestId": request["requestId"], "errorType": "CLIENT_ERROR"});
                remote_write
                    .write_all(format!("{reply}\n").as_bytes())
                    .await
                    .unwrap();
            }
        });

        let err = bridge.send("CondoWebAppRedirect", None).await.unwrap_err();
        assert_eq!(
            err.remote_envelope().and_then(|e| e.get("errorType")),
            Some(&json!("CLIENT_ERROR"))
        );
        host.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_survives_non_utf8_line() {
        init_tracing();
        let (local, remote) = duplex(4096);
        let (local_read, local_write) = split(local);
        let transport = StreamTransport::spawn(
            local_read,
            local_write,
            HOST_ORIGIN,
            OriginPolicy::exact(HOST_ORIGIN),
        )
        .unwrap();
        let bridge = Bridge::new(host_config(), Arc::new(transport)).unwrap();

        let host = tokio::spawn(async move {
            let (remote_read, mut remote_write) = split(remote);
            let mut lines = BufReader::new(remote_read).lines();
            if let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                let reply = json!({"requestId": request["requestId"], "ok": true});
                remote_write.write_all(b"\xff\xfe garbage\n").await.unwrap();
                remote_write
                    .write_all(format!("{reply}\n").as_bytes())
                    .await
                    .unwrap();
            }
        });

        let response = bridge.send_with(
            "CondoWebAppGetLaunchParams",
            None,
            SendOptions::default().without_timeout(),
        );
        let payload = tokio::time::timeout(Duration::from_secs(2), response)
            .await
            .expect("reply after a non-UTF-8 line should still be delivered")
            .unwrap();
        assert_eq!(payload["ok"], true);
        assert_eq!(bridge.pending_count(), 0);
        host.await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_inbound_cannot_be_shared() {
        let (local, _remote) = duplex(64);
        let (r, w) = split(local);
        let transport = Arc::new(
            StreamTransport::spawn(r, w, HOST_ORIGIN, OriginPolicy::permissive()).unwrap(),
        );

        let _first = Bridge::new(permissive_config(), transport.clone()).unwrap();
        assert!(matches!(
            Bridge::new(permissive_config(), transport),
            Err(BridgeError::Transport(_))
        ));
    }
}
