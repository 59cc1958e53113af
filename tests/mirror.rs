//! End-to-end mirroring: rewriting, redirects, header policy.

use axum::http::{header, StatusCode};

mod common;

#[tokio::test]
async fn test_html_rewritten_and_policies_stripped() {
    let upstream = common::start_upstream().await;
    let proxy = common::start_proxy(common::proxy_config(&upstream.origin())).await;

    let res = common::client().get(proxy.url("/proxy/page")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(header::CONTENT_SECURITY_POLICY).is_none());
    assert!(res.headers().get(header::X_FRAME_OPTIONS).is_none());
    assert_eq!(res.headers()[header::CACHE_CONTROL], "no-store");
    assert!(res.headers().get("x-request-id").is_some());
    common::session_pair(&res);

    let body = res.text().await.unwrap();
    assert!(body.contains(r#"href="/proxy/x""#), "{}", body);
    assert!(body.contains(r#"href="/proxy/style.css""#));
    assert!(body.contains(&format!(r#"src="{}/proxy/img.png""#, proxy.origin())));
    assert!(body.contains(&format!(r#""{}/proxy/api""#, proxy.origin())));
    assert!(body.contains("https://cdn.example.net/lib.js"));
    assert!(!body.contains(&upstream.addr.to_string()));
}

#[tokio::test]
async fn test_unmounted_path_is_equivalent() {
    let upstream = common::start_upstream().await;
    let proxy = common::start_proxy(common::proxy_config(&upstream.origin())).await;
    let client = common::client();

    let mounted = client.get(proxy.url("/proxy/page")).send().await.unwrap().text().await.unwrap();
    let bare = client.get(proxy.url("/page")).send().await.unwrap().text().await.unwrap();
    assert_eq!(mounted, bare);
}

#[tokio::test]
async fn test_css_url_rewritten_once() {
    let upstream = common::start_upstream().await;
    let proxy = common::start_proxy(common::proxy_config(&upstream.origin())).await;

    let body = common::client()
        .get(proxy.url("/proxy/style.css"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "body{background:url(/proxy/style.css)}");
}

#[tokio::test]
async fn test_binary_passthrough_is_byte_identical() {
    let upstream = common::start_upstream().await;
    let proxy = common::start_proxy(common::proxy_config(&upstream.origin())).await;

    let res = common::client().get(proxy.url("/proxy/img.png")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
    assert!(res.headers().get(header::CACHE_CONTROL).is_none());
    let bytes = res.bytes().await.unwrap();
    assert_eq!(&bytes[..], common::PNG_BYTES);
}

#[tokio::test]
async fn test_redirect_location_mapped_and_cookie_kept() {
    let upstream = common::start_upstream().await;
    let proxy = common::start_proxy(common::proxy_config(&upstream.origin())).await;
    let client = common::client();

    let res = client.post(proxy.url("/proxy/login")).body("user=a").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()[header::LOCATION], format!("{}/proxy/home", proxy.origin()));
    let session = common::session_pair(&res);

    let echoed = client
        .get(proxy.url("/proxy/echo"))
        .header(header::COOKIE, session)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(echoed.contains("cookie=auth=granted"), "{}", echoed);
}

#[tokio::test]
async fn test_upstream_sees_its_own_host_and_referer() {
    let upstream = common::start_upstream().await;
    let proxy = common::start_proxy(common::proxy_config(&upstream.origin())).await;

    let echoed = common::client()
        .get(proxy.url("/proxy/echo"))
        .header(header::REFERER, proxy.url("/proxy/page?tab=2"))
        .header(header::COOKIE, "tracking=browser-only")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(echoed.contains(&format!("host={}\n", upstream.addr)), "{}", echoed);
    assert!(echoed.contains(&format!("referer={}/page?tab=2\n", upstream.origin())), "{}", echoed);
    assert!(echoed.contains("cookie=\n"), "browser cookies must not reach the upstream: {}", echoed);
    assert!(!echoed.contains("x-request-id=\n"));
}

#[tokio::test]
async fn test_upload_body_reaches_upstream_unchanged() {
    let upstream = common::start_upstream().await;
    let proxy = common::start_proxy(common::proxy_config(&upstream.origin())).await;

    let content_type = "multipart/form-data; boundary=XyZ";
    let mut body = b"--XyZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.bin\"\r\n\r\n".to_vec();
    body.extend_from_slice(common::PNG_BYTES);
    body.extend_from_slice(b"\r\n--XyZ--\r\n");

    let res = common::client()
        .post(proxy.url("/proxy/upload"))
        .header(header::CONTENT_TYPE, content_type)
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-seen-content-type"], content_type);
    assert_eq!(&res.bytes().await.unwrap()[..], &body[..]);
}
