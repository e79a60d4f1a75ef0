//! Fluent surface behavior that needs no network.

use guise::{ClientExt, Guise};

#[tokio::test]
async fn invalid_url_surfaces_at_send() {
    let client = Guise::builder().build().unwrap();
    let error = client.fetch("http:///no-host").send().await.unwrap_err();
    assert!(error.to_string().contains("builder"));
}

#[tokio::test]
async fn builder_composes_profile_and_overrides() {
    let client = Guise::builder()
        .impersonate()
        .firefox()
        .user_agent("override/1.0")
        .session()
        .build()
        .unwrap();
    assert_eq!(
        client.default_headers().get("user-agent"),
        Some("override/1.0")
    );
}

#[test]
fn shared_client_is_reused() {
    let a = Guise::client();
    let b = Guise::client();
    assert!(std::sync::Arc::ptr_eq(&a, &b));
}
