//! Failure injection: timeouts, unreachable upstreams, retries.

use std::time::{Duration, Instant};

use axum::http::StatusCode;

mod common;

#[tokio::test]
async fn test_slow_upstream_times_out_with_504() {
    let upstream = common::start_upstream().await;
    let mut config = common::proxy_config(&upstream.origin());
    config.timeouts.request_secs = 1;
    config.retries.enabled = false;
    let proxy = common::start_proxy(config).await;

    let start = Instant::now();
    let res = common::client().get(proxy.url("/proxy/slow")).send().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(elapsed < Duration::from_millis(2500), "took {:?}", elapsed);
    assert_eq!(res.text().await.unwrap(), "upstream error: timed out");
}

#[tokio::test]
async fn test_unreachable_upstream_is_502() {
    // reserve a port, then free it so nothing listens there
    let addr = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let mut config = common::proxy_config(&format!("http://{}", addr));
    config.timeouts.connect_secs = 1;
    let proxy = common::start_proxy(config).await;

    let res = common::client().get(proxy.url("/proxy/anything")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    common::session_pair(&res);
    let body = res.text().await.unwrap();
    assert!(body.starts_with("upstream error: "), "{}", body);
    assert!(!body.contains(&addr.to_string()));
}

#[tokio::test]
async fn test_get_retried_on_503() {
    let upstream = common::start_upstream().await;
    let proxy = common::start_proxy(common::proxy_config(&upstream.origin())).await;

    let res = common::client().get(proxy.url("/proxy/flaky")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "recovered");
    assert_eq!(upstream.flaky_count(), 2);
}

#[tokio::test]
async fn test_post_never_retried() {
    let upstream = common::start_upstream().await;
    let proxy = common::start_proxy(common::proxy_config(&upstream.origin())).await;

    let res = common::client()
        .post(proxy.url("/proxy/flaky-post"))
        .body("a=1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(upstream.post_count(), 1);
}
