//! Integration coverage for the gateway properties that need a real
//! HTTP stand-in: cache hits avoiding a second round-trip, the
//! `INVALID_SESSION_ID` refresh-and-retry loop, and cache invalidation on a
//! write. `mockito` stands in for the Salesforce org.

use async_trait::async_trait;
use sf_context_mcp::error::Result;
use sf_context_mcp::gateway::{ApiType, CallOptions, Method, SfGateway, TokenRefresher};
use sf_context_mcp::state::OrgIdentity;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct StubRefresher {
    calls: Arc<AtomicUsize>,
    new_token: String,
    instance_url: String,
}

#[async_trait]
impl TokenRefresher for StubRefresher {
    async fn refresh(&self) -> Result<OrgIdentity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(OrgIdentity {
            alias: Some("refreshed".into()),
            username: "user@example.com".into(),
            instance_url: self.instance_url.clone(),
            access_token: self.new_token.clone(),
            api_version: "59.0".into(),
            id: "00Dxx0000000001".into(),
            user: None,
            company_details: None,
        })
    }
}

fn identity(instance_url: &str, token: &str) -> OrgIdentity {
    OrgIdentity {
        alias: Some("default".into()),
        username: "user@example.com".into(),
        instance_url: instance_url.into(),
        access_token: token.into(),
        api_version: "59.0".into(),
        id: "00Dxx0000000001".into(),
        user: None,
        company_details: None,
    }
}

#[tokio::test]
async fn a_read_is_served_from_cache_on_the_second_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/services/data/v59.0/sobjects/Account/001xx")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"Id":"001xx","Name":"Acme"}"#)
        .expect(1)
        .create_async()
        .await;

    let org = Arc::new(parking_lot::RwLock::new(identity(&server.url(), "tok-1")));
    let refresher = Arc::new(StubRefresher {
        calls: Arc::new(AtomicUsize::new(0)),
        new_token: "tok-2".into(),
        instance_url: server.url(),
    });
    let gateway = SfGateway::new(10_000, 200, false, org, refresher).unwrap();

    for _ in 0..2 {
        let result = gateway
            .call(Method::Get, ApiType::Rest, "sobjects/Account/001xx", None, CallOptions::default())
            .await
            .unwrap();
        assert_eq!(result["Name"], "Acme");
    }

    mock.assert_async().await;
    assert_eq!(gateway.cache_len(), 1);
}

#[tokio::test]
async fn invalid_session_id_triggers_one_refresh_and_a_retry() {
    let mut server = mockito::Server::new_async().await;
    let stale = server
        .mock("GET", "/services/data/v59.0/sobjects/Account/001xx")
        .match_header("authorization", "Bearer tok-1")
        .with_status(401)
        .with_body(r#"[{"errorCode":"INVALID_SESSION_ID","message":"Session expired"}]"#)
        .expect(1)
        .create_async()
        .await;
    let fresh = server
        .mock("GET", "/services/data/v59.0/sobjects/Account/001xx")
        .match_header("authorization", "Bearer tok-2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"Id":"001xx","Name":"Acme"}"#)
        .expect(1)
        .create_async()
        .await;

    let org = Arc::new(parking_lot::RwLock::new(identity(&server.url(), "tok-1")));
    let calls = Arc::new(AtomicUsize::new(0));
    let refresher = Arc::new(StubRefresher {
        calls: calls.clone(),
        new_token: "tok-2".into(),
        instance_url: server.url(),
    });
    let gateway = SfGateway::new(10_000, 200, false, org, refresher).unwrap();

    let result = gateway
        .call(Method::Get, ApiType::Rest, "sobjects/Account/001xx", None, CallOptions::default())
        .await
        .unwrap();

    assert_eq!(result["Name"], "Acme");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    stale.assert_async().await;
    fresh.assert_async().await;
}

#[tokio::test]
async fn a_write_clears_the_cache() {
    let mut server = mockito::Server::new_async().await;
    let get_mock = server
        .mock("GET", "/services/data/v59.0/sobjects/Account/001xx")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"Id":"001xx","Name":"Acme"}"#)
        .create_async()
        .await;
    let patch_mock = server
        .mock("PATCH", "/services/data/v59.0/sobjects/Account/001xx")
        .with_status(204)
        .with_body("")
        .create_async()
        .await;

    let org = Arc::new(parking_lot::RwLock::new(identity(&server.url(), "tok-1")));
    let refresher = Arc::new(StubRefresher {
        calls: Arc::new(AtomicUsize::new(0)),
        new_token: "tok-2".into(),
        instance_url: server.url(),
    });
    let gateway = SfGateway::new(10_000, 200, false, org, refresher).unwrap();

    gateway
        .call(Method::Get, ApiType::Rest, "sobjects/Account/001xx", None, CallOptions::default())
        .await
        .unwrap();
    assert_eq!(gateway.cache_len(), 1);

    gateway
        .call(
            Method::Patch,
            ApiType::Rest,
            "sobjects/Account/001xx",
            Some(serde_json::json!({"Name": "Acme Corp"})),
            CallOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(gateway.cache_len(), 0);
    get_mock.assert_async().await;
    patch_mock.assert_async().await;
}

#[tokio::test]
async fn calling_before_org_identity_is_set_fails_with_not_initialized() {
    let org = Arc::new(parking_lot::RwLock::new(OrgIdentity::default()));
    let refresher = Arc::new(StubRefresher {
        calls: Arc::new(AtomicUsize::new(0)),
        new_token: "tok".into(),
        instance_url: "https://example.my.salesforce.com".into(),
    });
    let gateway = SfGateway::new(10_000, 200, false, org, refresher).unwrap();

    let result = gateway
        .call(Method::Get, ApiType::Rest, "sobjects/Account/001xx", None, CallOptions::default())
        .await;

    assert!(matches!(result, Err(sf_context_mcp::Error::NotInitialized(_))));
}
