//! End-to-end pipeline tests against a scripted loopback server.

mod support;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use guise_client::ClientBuilder;
use support::Reply;

#[tokio::test]
async fn get_returns_body_and_protocol() {
    let addr = support::serve(|_| Reply::ok("hello world")).await;
    let client = ClientBuilder::new().build().unwrap();

    let request = client.get(format!("http://{addr}/")).unwrap();
    let mut response = client.execute(request).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.protocol(), "HTTP/1.1");
    assert_eq!(response.string().await.unwrap(), "hello world");
}

#[tokio::test]
async fn retry_consumes_transient_statuses() {
    let hits = Arc::new(AtomicU32::new(0));
    let served = Arc::clone(&hits);
    let addr = support::serve(move |_| {
        match served.fetch_add(1, Ordering::SeqCst) {
            0 | 1 => Reply::status(503, "Service Unavailable"),
            _ => Reply::ok("recovered"),
        }
    })
    .await;

    let client = ClientBuilder::new()
        .retry(2, Duration::from_millis(20), vec![500, 503])
        .build()
        .unwrap();
    let request = client.get(format!("http://{addr}/flaky")).unwrap();
    let mut response = client.execute(request).await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.attempts(), 3);
    assert_eq!(response.string().await.unwrap(), "recovered");
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_gives_up_after_budget() {
    let addr = support::serve(|_| Reply::status(503, "Service Unavailable")).await;
    let client = ClientBuilder::new()
        .retry(1, Duration::from_millis(5), vec![503])
        .build()
        .unwrap();
    let request = client.get(format!("http://{addr}/")).unwrap();
    let response = client.execute(request).await.unwrap();
    // budget exhausted: the transient status is returned, not an error
    assert_eq!(response.status().as_u16(), 503);
    assert_eq!(response.attempts(), 2);
}

#[tokio::test]
async fn redirects_follow_up_to_the_limit() {
    let addr = support::serve(|seen| {
        let hop: u32 = seen.path.trim_start_matches("/r/").parse().unwrap_or(0);
        if hop == 0 {
            Reply::ok("landed")
        } else {
            Reply::redirect(&format!("/r/{}", hop - 1))
        }
    })
    .await;

    let client = ClientBuilder::new().history().build().unwrap();
    let request = client.get(format!("http://{addr}/r/3")).unwrap();
    let mut response = client.execute(request).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.url().path(), "/r/0");
    assert_eq!(response.history().len(), 3);
    assert_eq!(response.string().await.unwrap(), "landed");
}

#[tokio::test]
async fn too_many_redirects_is_an_error() {
    let addr = support::serve(|seen| {
        let hop: u32 = seen.path.trim_start_matches("/r/").parse().unwrap_or(0);
        Reply::redirect(&format!("/r/{}", hop + 1))
    })
    .await;

    let client = ClientBuilder::new().max_redirects(4).build().unwrap();
    let request = client.get(format!("http://{addr}/r/0")).unwrap();
    let error = client.execute(request).await.unwrap_err();
    assert!(error.is_redirect());
    // history was not enabled, so the error carries no hops
    assert!(error.redirect_history().is_empty());
}

#[tokio::test]
async fn redirect_error_carries_history_when_enabled() {
    let addr = support::serve(|seen| {
        let hop: u32 = seen.path.trim_start_matches("/r/").parse().unwrap_or(0);
        Reply::redirect(&format!("/r/{}", hop + 1))
    })
    .await;

    let client = ClientBuilder::new()
        .max_redirects(4)
        .history()
        .build()
        .unwrap();
    let request = client.get(format!("http://{addr}/r/0")).unwrap();
    let error = client.execute(request).await.unwrap_err();
    assert!(error.is_redirect());

    // four hops were followed before the limit tripped
    let history = error.redirect_history();
    assert_eq!(history.len(), 4);
    let paths: Vec<&str> = history.iter().map(|h| h.url.path()).collect();
    assert_eq!(paths, vec!["/r/0", "/r/1", "/r/2", "/r/3"]);
    assert!(history.iter().all(|h| h.status.as_u16() == 302));
}

#[tokio::test]
async fn timeout_cuts_a_stalled_response() {
    // A listener that accepts and then never answers.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let client = ClientBuilder::new()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let request = client.get(format!("http://{addr}/delay")).unwrap();
    let error = client.execute(request).await.unwrap_err();
    assert!(error.is_timeout());
}

#[tokio::test]
async fn cached_body_reads_twice() {
    let addr = support::serve(|_| Reply::ok("cache me")).await;
    let client = ClientBuilder::new().cache_body().build().unwrap();
    let request = client.get(format!("http://{addr}/")).unwrap();
    let mut response = client.execute(request).await.unwrap();

    let first = response.string().await.unwrap();
    let second = response.string().await.unwrap();
    assert_eq!(first, "cache me");
    assert_eq!(first, second);
}

#[tokio::test]
async fn session_cookies_flow_between_requests() {
    let addr = support::serve(|seen| {
        if seen.path == "/set" {
            Reply::ok("set").header("Set-Cookie", "sid=abc123; Path=/")
        } else {
            match seen.header("cookie") {
                Some(value) if value.contains("sid=abc123") => Reply::ok("with-cookie"),
                _ => Reply::status(403, "Forbidden"),
            }
        }
    })
    .await;

    let client = ClientBuilder::new().session().build().unwrap();
    let set = client.get(format!("http://{addr}/set")).unwrap();
    client.execute(set).await.unwrap();

    let check = client.get(format!("http://{addr}/check")).unwrap();
    let mut response = client.execute(check).await.unwrap();
    assert_eq!(response.string().await.unwrap(), "with-cookie");
}

#[tokio::test]
async fn file_upload_builds_multipart() {
    let addr = support::serve(|seen| {
        let body = String::from_utf8_lossy(&seen.body).into_owned();
        let content_type = seen.header("content-type").unwrap_or_default().to_string();
        if body.contains("Content-Disposition: form-data; name=\"f\"; filename=\"x.txt\"")
            && body.contains("hello")
            && content_type.starts_with("multipart/form-data; boundary=")
        {
            Reply::ok("accepted")
        } else {
            Reply::status(400, "Bad Request")
        }
    })
    .await;

    let client = ClientBuilder::new().build().unwrap();
    let request = client
        .file_upload(format!("http://{addr}/upload"), "f", "x.txt", &b"hello"[..])
        .unwrap();
    let mut response = client.execute(request).await.unwrap();
    assert_eq!(response.string().await.unwrap(), "accepted");
}

#[tokio::test]
async fn hooks_see_request_and_response() {
    let addr = support::serve(|seen| {
        if seen.header("x-hooked") == Some("1") {
            Reply::ok("hooked")
        } else {
            Reply::status(400, "Bad Request")
        }
    })
    .await;

    let client = ClientBuilder::new()
        .request_hook(|request| {
            request.headers.set("X-Hooked", "1");
            Ok(())
        })
        .build()
        .unwrap();
    let request = client.get(format!("http://{addr}/")).unwrap();
    let mut response = client.execute(request).await.unwrap();
    assert_eq!(response.string().await.unwrap(), "hooked");
}

#[tokio::test]
async fn default_headers_reach_the_wire_in_order() {
    let addr = support::serve(|seen| {
        let ua = seen.header("user-agent").unwrap_or_default();
        if ua.contains("Chrome/131") {
            Reply::ok("ok")
        } else {
            Reply::status(400, "Bad Request")
        }
    })
    .await;

    let client = ClientBuilder::new().impersonate().chrome().build().unwrap();
    let request = client.get(format!("http://{addr}/")).unwrap();
    let mut response = client.execute(request).await.unwrap();
    assert_eq!(response.string().await.unwrap(), "ok");
}
