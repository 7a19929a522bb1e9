// copilot-mcp - Gateway integration tests (mock upstream over HTTP)

mod common;

use std::time::Duration;

use copilot_mcp::error::BridgeError;
use copilot_mcp::gateway::{CompletionOptions, Endpoint};
use serde_json::json;

use common::{harness, Reply};

#[tokio::test]
async fn identical_completions_hit_upstream_once() {
    let h = harness(vec![]).await;
    let params = json!({ "code": "x", "language": "ts" });

    let first = h.ctx.gateway.complete(&params, CompletionOptions::default()).await.unwrap();
    let second = h.ctx.gateway.complete(&params, CompletionOptions::default()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first, json!({ "completion": "result" }));
    assert_eq!(h.upstream.hits(), 1);
}

#[tokio::test]
async fn cache_key_ignores_param_order() {
    let h = harness(vec![]).await;
    let a: serde_json::Value = serde_json::from_str(r#"{"code":"x","language":"ts"}"#).unwrap();
    let b: serde_json::Value = serde_json::from_str(r#"{"language":"ts","code":"x"}"#).unwrap();

    h.ctx.gateway.complete(&a, CompletionOptions::default()).await.unwrap();
    h.ctx.gateway.complete(&b, CompletionOptions::default()).await.unwrap();
    assert_eq!(h.upstream.hits(), 1);
}

#[tokio::test]
async fn disabled_cache_always_calls_upstream() {
    let h = harness(vec![]).await;
    let params = json!({ "code": "x", "language": "ts" });
    let options = CompletionOptions {
        cache: false,
        ..CompletionOptions::default()
    };

    h.ctx.gateway.complete(&params, options).await.unwrap();
    h.ctx.gateway.complete(&params, options).await.unwrap();
    assert_eq!(h.upstream.hits(), 2);
}

#[tokio::test]
async fn expired_entry_is_refetched() {
    let h = harness(vec![]).await;
    let params = json!({ "code": "x", "language": "ts" });
    let options = CompletionOptions {
        ttl: Some(Duration::from_millis(50)),
        ..CompletionOptions::default()
    };

    h.ctx.gateway.complete(&params, options).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    h.ctx.gateway.complete(&params, options).await.unwrap();
    assert_eq!(h.upstream.hits(), 2);
}

#[tokio::test]
async fn review_and_explain_are_not_cached() {
    let h = harness(vec![]).await;
    let params = json!({ "code": "x" });

    h.ctx.gateway.review(&params).await.unwrap();
    h.ctx.gateway.review(&params).await.unwrap();
    h.ctx.gateway.explain(&params).await.unwrap();

    let endpoints: Vec<String> = h.upstream.seen().into_iter().map(|s| s.endpoint).collect();
    assert_eq!(endpoints, vec!["review", "review", "explain"]);
}

#[tokio::test]
async fn requests_carry_bearer_token_and_user_agent() {
    let h = harness(vec![]).await;
    let body = json!({ "code": "x", "language": "rust" });
    h.ctx.gateway.call(Endpoint::Completions, &body, 0).await.unwrap();

    let seen = h.upstream.seen();
    assert_eq!(seen[0].authorization.as_deref(), Some("Bearer tok-1"));
    assert_eq!(seen[0].user_agent.as_deref(), Some("copilot-mcp"));
    assert_eq!(seen[0].body, body);
}

#[tokio::test]
async fn unauthorized_triggers_exactly_one_forced_refresh() {
    let h = harness(vec![Reply::status(401), Reply::ok(json!({ "review": "lgtm" }))]).await;

    let result = h.ctx.gateway.review(&json!({ "code": "x" })).await.unwrap();

    assert_eq!(result, json!({ "review": "lgtm" }));
    assert_eq!(h.provider.calls(), 2);
    let seen = h.upstream.seen();
    assert_eq!(seen[0].authorization.as_deref(), Some("Bearer tok-1"));
    assert_eq!(seen[1].authorization.as_deref(), Some("Bearer tok-2"));
}

#[tokio::test]
async fn rate_limit_honours_retry_after() {
    let h = harness(vec![
        Reply::status(429).with_header("retry-after", "1"),
        Reply::ok(json!({ "ok": true })),
    ])
    .await;

    let result = h.ctx.gateway.explain(&json!({ "code": "x" })).await.unwrap();
    assert_eq!(result, json!({ "ok": true }));

    let seen = h.upstream.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[1].at - seen[0].at >= Duration::from_secs(1));
}

#[tokio::test]
async fn server_errors_back_off_and_recover() {
    let h = harness(vec![Reply::status(502), Reply::status(503), Reply::ok(json!({ "ok": 1 }))]).await;

    let result = h.ctx.gateway.review(&json!({ "code": "x" })).await.unwrap();
    assert_eq!(result, json!({ "ok": 1 }));
    assert_eq!(h.upstream.hits(), 3);
    // Backoff unit is 5ms: 5ms then 10ms.
    let seen = h.upstream.seen();
    assert!(seen[2].at - seen[0].at >= Duration::from_millis(15));
}

#[tokio::test]
async fn retries_share_one_budget_and_then_fail() {
    let h = harness(vec![Reply::status(500), Reply::status(429), Reply::status(503)]).await;

    let err = h.ctx.gateway.review(&json!({ "code": "x" })).await.unwrap_err();
    match err {
        BridgeError::UpstreamRequestFailed { status, body } => {
            assert_eq!(status, 503);
            assert!(body.contains("status 503"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.upstream.hits(), 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let h = harness(vec![Reply::status(422)]).await;

    let err = h.ctx.gateway.review(&json!({ "code": "x" })).await.unwrap_err();
    assert!(matches!(err, BridgeError::UpstreamRequestFailed { status: 422, .. }));
    assert_eq!(h.upstream.hits(), 1);
}

#[tokio::test]
async fn zero_retries_surfaces_first_failure() {
    let h = harness(vec![Reply::status(401)]).await;

    let err = h
        .ctx
        .gateway
        .call(Endpoint::Review, &json!({ "code": "x" }), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::UpstreamRequestFailed { status: 401, .. }));
    assert_eq!(h.provider.calls(), 1);
}

#[tokio::test]
async fn failed_calls_are_not_cached() {
    let h = harness(vec![Reply::status(400)]).await;
    let params = json!({ "code": "x", "language": "ts" });

    assert!(h.ctx.gateway.complete(&params, CompletionOptions::default()).await.is_err());
    h.ctx.gateway.complete(&params, CompletionOptions::default()).await.unwrap();
    assert_eq!(h.upstream.hits(), 2);
}

#[tokio::test]
async fn unrepresentable_retry_after_falls_back_to_backoff() {
    let h = harness(vec![
        Reply::status(429).with_header("retry-after", "1e30"),
        Reply::ok(json!({ "ok": true })),
    ])
    .await;

    let result = h.ctx.gateway.explain(&json!({ "code": "x" })).await.unwrap();
    assert_eq!(result, json!({ "ok": true }));
    assert_eq!(h.upstream.hits(), 2);
}
