//! # Request Correlation Flows
//!
//! Every `send` settles exactly once, with the response carrying its own
//! request id, no matter how responses are ordered, duplicated or mixed
//! with unrelated traffic.

#[cfg(test)]
mod tests {
    use crate::support::{barrier, bridge_with_host, host_config, permissive_config, TestHost};
    use condo_bridge::{Bridge, BridgeError, RequestId, SendOptions};
    use futures::future::join_all;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::time::Duration;

    // =============================================================================
    // ROUND TRIPS
    // =============================================================================

    #[tokio::test]
    async fn test_echo_round_trip() {
        let (bridge, host) = bridge_with_host(host_config());
        let echo = host.spawn_echo();

        let payload = bridge
            .send("CondoWebAppShowNotification", Some(json!({"type": "info", "message": "Hi"})))
            .await
            .unwrap();

        assert_eq!(payload["requestId"], 1);
        assert_eq!(payload["type"], "info");
        assert_eq!(payload["message"], "Hi");
        echo.abort();
    }

    #[tokio::test]
    async fn test_wire_shape() {
        let (bridge, mut host) = bridge_with_host(host_config());

        let _with_params = bridge.send("CondoWebAppResizeWindow", Some(json!({"height": 300})));
        let _without_params = bridge.send("CondoWebAppGetFragment", None);
        let requests = host.next_requests(2).await;

        let first = serde_json::to_value(&requests[0]).unwrap();
        assert_eq!(
            first,
            json!({
                "handler": "CondoWebAppResizeWindow",
                "params": {"height": 300},
                "requestId": 1,
                "type": "condo-bridge",
                "version": condo_bridge::VERSION,
            })
        );
        let second = serde_json::to_value(&requests[1]).unwrap();
        assert!(second.get("params").is_none());
    }

    #[tokio::test]
    async fn test_error_response_rejects_with_envelope() {
        let (bridge, mut host) = bridge_with_host(host_config());

        let response = bridge.send("CondoWebAppRequestAuth", Some(json!({"url": "https://x"})));
        let request = host.next_request().await;
        host.reply_error(&request, "ACCESS_DENIED", json!({"errorMessage": "nope", "errorCode": 2}));

        match response.await {
            Err(BridgeError::Remote(remote)) => {
                assert_eq!(remote.error_type, "ACCESS_DENIED");
                assert_eq!(remote.field("errorMessage"), Some("nope"));
                assert_eq!(remote.envelope["errorCode"], 2);
                assert_eq!(remote.envelope["requestId"], 1);
                assert_eq!(remote.to_string(), "ACCESS_DENIED: nope");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_error_type_still_rejects() {
        let (bridge, mut host) = bridge_with_host(host_config());

        let response = bridge.send("echo", None);
        let _request = host.next_request().await;
        host.post(json!({"requestId": 1, "errorType": null}));

        assert!(matches!(response.await, Err(BridgeError::Remote(_))));
    }

    // =============================================================================
    // CONCURRENCY AND ORDERING
    // =============================================================================

    #[tokio::test]
    async fn test_out_of_order_responses_match_their_requests() {
        let (bridge, mut host) = bridge_with_host(host_config());

        let responses: Vec<_> = (0..10)
            .map(|i| bridge.send("echo", Some(json!({"i": i}))))
            .collect();
        let requests = host.next_requests(10).await;

        for request in requests.iter().rev() {
            let params = request.params.clone().unwrap_or(Value::Null);
            host.reply(request, params);
        }

        for (i, result) in join_all(responses).await.into_iter().enumerate() {
            assert_eq!(result.unwrap()["i"], i);
        }
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_response_is_ignored() {
        let (bridge, mut host) = bridge_with_host(host_config());

        let response = bridge.send("echo", None);
        let request = host.next_request().await;
        host.reply(&request, json!({"n": 1}));
        host.reply(&request, json!({"n": 2}));

        assert_eq!(response.await.unwrap()["n"], 1);
        barrier(&bridge, &mut host).await;

        let stats = bridge.stats().requests;
        assert_eq!(stats.unmatched, 1);
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_response_to_unknown_id_is_ignored() {
        let (bridge, mut host) = bridge_with_host(host_config());

        host.post(json!({"requestId": 999, "a": 1}));
        barrier(&bridge, &mut host).await;

        assert_eq!(bridge.stats().requests.unmatched, 1);
    }

    #[tokio::test]
    async fn test_echoed_request_is_not_a_response() {
        let (bridge, mut host) = bridge_with_host(host_config());

        let response = bridge.send("echo", Some(json!({"x": 1})));
        let request = host.next_request().await;

        // Another frame re-broadcasts our own request on the shared channel
        host.post(serde_json::to_value(&request).unwrap());
        host.reply(&request, json!({"answer": true}));

        let payload = response.await.unwrap();
        assert_eq!(payload["answer"], true);
        assert!(payload.get("handler").is_none());
    }

    #[tokio::test]
    async fn test_malformed_payloads_do_not_disturb_pending() {
        let (bridge, mut host) = bridge_with_host(host_config());

        let response = bridge.send("echo", None);
        let request = host.next_request().await;

        host.post(json!("garbage"));
        host.post(json!(42));
        host.post(json!(null));
        host.post(json!({"requestId": {"nested": 1}}));
        host.post(json!({"requestId": -1}));
        assert_eq!(bridge.pending_count(), 1);

        host.reply(&request, json!({"ok": true}));
        assert_eq!(response.await.unwrap()["ok"], true);
    }

    // =============================================================================
    // CUSTOM IDS
    // =============================================================================

    #[tokio::test]
    async fn test_custom_request_id() {
        let (bridge, mut host) = bridge_with_host(host_config());

        let response = bridge.send_with(
            "echo",
            None,
            SendOptions::default().with_request_id("order-7"),
        );
        let request = host.next_request().await;
        assert_eq!(request.request_id, RequestId::from("order-7"));

        host.reply(&request, json!({"ok": 1}));
        assert_eq!(response.await.unwrap()["requestId"], "order-7");
    }

    #[tokio::test]
    async fn test_duplicate_custom_id_rejected_while_pending() {
        let (bridge, mut host) = bridge_with_host(host_config());
        let options = SendOptions::default().with_request_id("same");

        let first = bridge.send_with("echo", None, options.clone());
        let second = bridge.send_with("echo", None, options.clone());
        assert!(second.request_id().is_none());
        assert!(matches!(
            second.await,
            Err(BridgeError::DuplicateRequestId(id)) if id == RequestId::from("same")
        ));

        let request = host.next_request().await;
        assert!(host.try_next_request().is_none());
        host.reply(&request, json!({"n": 1}));
        assert_eq!(first.await.unwrap()["n"], 1);

        // Free again once settled
        let third = bridge.send_with("echo", None, options);
        let request = host.next_request().await;
        host.reply(&request, json!({"n": 3}));
        assert_eq!(third.await.unwrap()["n"], 3);
    }

    #[tokio::test]
    async fn test_numeric_custom_id_is_skipped_by_generator() {
        let (bridge, mut host) = bridge_with_host(host_config());

        let _claimed = bridge.send_with("echo", None, SendOptions::default().with_request_id(1u64));
        let _generated = bridge.send("echo", None);

        let requests = host.next_requests(2).await;
        assert_eq!(requests[0].request_id, RequestId::from(1));
        assert_eq!(requests[1].request_id, RequestId::from(2));
    }

    // =============================================================================
    // TIMEOUTS AND CANCELLATION
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out() {
        let (bridge, mut host) = bridge_with_host(host_config());

        let response = bridge.send_with(
            "echo",
            None,
            SendOptions::default().with_timeout(Duration::from_millis(250)),
        );
        let request = host.next_request().await;

        let err = response.await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.request_id(), Some(&request.request_id));
        assert_eq!(bridge.pending_count(), 0);

        // Late reply is harmless
        host.reply(&request, json!({}));
        barrier(&bridge, &mut host).await;
        assert_eq!(bridge.stats().requests.timeouts, 1);
        assert_eq!(bridge.stats().requests.unmatched, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_disabled_waits_until_reply() {
        let mut config = host_config();
        config.timeouts.enabled = false;
        let (bridge, mut host) = bridge_with_host(config);

        let response = bridge.send("echo", None);
        let request = host.next_request().await;

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(bridge.pending_count(), 1);

        host.reply(&request, json!({"late": true}));
        assert_eq!(response.await.unwrap()["late"], true);
    }

    #[tokio::test]
    async fn test_dropped_response_frees_entry() {
        let (bridge, mut host) = bridge_with_host(host_config());

        let response = bridge.send("echo", None);
        let request = host.next_request().await;
        assert_eq!(bridge.pending_count(), 1);

        drop(response);
        assert_eq!(bridge.pending_count(), 0);

        host.reply(&request, json!({}));
        barrier(&bridge, &mut host).await;
        assert_eq!(bridge.stats().requests.cancelled, 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight() {
        let (bridge, mut host) = bridge_with_host(host_config());

        let a = bridge.send("echo", None);
        let b = bridge.send("echo", None);
        host.next_requests(2).await;

        assert_eq!(bridge.shutdown(), 2);
        assert!(matches!(a.await, Err(BridgeError::Cancelled { .. })));
        assert!(matches!(b.await, Err(BridgeError::Cancelled { .. })));
        assert!(matches!(bridge.send("echo", None).await, Err(BridgeError::ShutDown)));
    }

    // =============================================================================
    // TYPED CALLS
    // =============================================================================

    #[derive(serde::Serialize)]
    struct Notification<'a> {
        #[serde(rename = "type")]
        kind: &'a str,
        message: &'a str,
    }

    #[derive(serde::Deserialize, Debug)]
    struct Ack {
        success: bool,
    }

    #[tokio::test]
    async fn test_typed_call() {
        let (bridge, mut host) = bridge_with_host(host_config());

        let host_task = tokio::spawn(async move {
            let request = host.next_request().await;
            assert_eq!(request.params, Some(json!({"type": "success", "message": "Saved"})));
            host.reply(&request, json!({"success": true}));
            host
        });

        let ack: Ack = bridge
            .call(
                "CondoWebAppShowNotification",
                &Notification { kind: "success", message: "Saved" },
            )
            .await
            .unwrap();
        assert!(ack.success);
        host_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_typed_call_decode_error() {
        let (bridge, host) = bridge_with_host(host_config());
        let echo = host.spawn_echo();

        let result: Result<Ack, _> = bridge.call("echo", &json!({"success": "not-bool"})).await;
        assert!(matches!(result, Err(BridgeError::Decode(_))));
        echo.abort();
    }

    // =============================================================================
    // PROPERTY: ANY RESPONSE ORDER
    // =============================================================================

    async fn run_permuted(bridge: &Bridge, host: &mut TestHost, order: &[usize]) {
        let responses: Vec<_> = (0..order.len())
            .map(|i| bridge.send("echo", Some(json!({"i": i}))))
            .collect();
        let requests = host.next_requests(order.len()).await;

        for &i in order {
            let params = requests[i].params.clone().unwrap_or(Value::Null);
            host.reply(&requests[i], params);
        }

        for (i, result) in join_all(responses).await.into_iter().enumerate() {
            assert_eq!(result.unwrap()["i"], i);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_any_response_order_resolves_each_request(
            order in Just((0..12usize).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let (bridge, mut host) = bridge_with_host(permissive_config());
                run_permuted(&bridge, &mut host, &order).await;
                assert_eq!(bridge.pending_count(), 0);
            });
        }
    }
}
