use cadenza_core::prelude::*;
use cadenza_test_support::*;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn expired_bundle() -> TokenBundle {
    TokenBundle::new("stale", Some("refresh-me".into()), Duration::ZERO, vec![])
}

fn fresh_response() -> TokenResponse {
    TokenResponse {
        access_token: "fresh".into(),
        token_type: "Bearer".into(),
        expires_in: 3600,
        refresh_token: None,
        scope: None,
    }
}

/// Counts refresh calls and yields once mid-refresh so racers can pile up
/// on the gate.
fn counting_authenticator(
    calls: Arc<AtomicUsize>,
) -> FnAuthenticator<impl Fn(&TokenBundle) -> RefreshFuture + Send + Sync + 'static> {
    FnAuthenticator(move |_: &TokenBundle| -> RefreshFuture {
        let calls = calls.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(fresh_response())
        })
    })
}

#[tokio::test(flavor = "current_thread")]
async fn refresh__two_racing_requests_trigger_exactly_one_refresh() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (transport, h) = mock()
        .replies([
            MockReply::ok_json(json_bytes(&json!([1]))),
            MockReply::ok_json(json_bytes(&json!([2]))),
        ])
        .build();

    let api = ApiClient::with_transport("https://api.example.com/v1", transport)
        .unwrap()
        .with_auth(AuthRuntime::new(
            expired_bundle(),
            counting_authenticator(calls.clone()),
        ));
    api.set_caching_enabled(false);

    let first = api.get::<Vec<u32>>("a");
    let second = api.get::<Vec<u32>>("b");
    let (r1, r2) = tokio::join!(first.run(), second.run());
    r1.unwrap();
    r2.unwrap();

    // Zero or two refresh calls is a failure; the loser must await the
    // winner's refresh.
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    h.assert_recorded_len(2);
    for req in h.recorded() {
        assert_request(&req).header("authorization", "Bearer fresh");
    }
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn refresh__valid_credential_is_not_refreshed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (transport, h) = mock()
        .replies([MockReply::ok_json(json_bytes(&json!([1])))])
        .build();

    let api = ApiClient::with_transport("https://api.example.com/v1", transport)
        .unwrap()
        .with_auth(AuthRuntime::new(
            TokenBundle::new("live", None, Duration::from_secs(3600), vec![]),
            counting_authenticator(calls.clone()),
        ));

    api.get::<Vec<u32>>("a").run().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_request(&h.recorded()[0]).header("authorization", "Bearer live");
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn refresh__failure_escalates_and_leaves_credential_unchanged() {
    let (transport, h) = mock().build();

    let auth = AuthRuntime::new(
        expired_bundle(),
        FnAuthenticator(|_: &TokenBundle| -> RefreshFuture {
            Box::pin(async { Err(Error::Authentication("grant revoked".into())) })
        }),
    );
    let api = ApiClient::with_transport("https://api.example.com/v1", transport)
        .unwrap()
        .with_auth(auth);

    let err = api.get::<Vec<u32>>("a").run().await.unwrap_err();
    assert!(matches!(err, Error::ReAuthenticationNeeded(_)));

    let auth = api.auth().unwrap();
    assert_eq!(auth.state(), TokenState::Invalid);
    assert_eq!(auth.bundle().access_token(), "stale");
    assert_eq!(auth.bundle().refresh_token(), Some("refresh-me"));

    // The triggering request never reached the transport.
    h.assert_recorded_len(0);
    h.finish();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn refresh__maintenance_task_refreshes_proactively() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (transport, h) = mock().build();

    let api = ApiClient::with_transport("https://api.example.com/v1", transport)
        .unwrap()
        .with_auth(AuthRuntime::new(
            expired_bundle(),
            counting_authenticator(calls.clone()),
        ));

    let _maintenance = api.start_maintenance(
        MaintenanceConfig::default().token_refresh_check(Duration::from_secs(30)),
    );

    tokio::time::advance(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.auth().unwrap().state(), TokenState::Valid);
    assert_eq!(api.auth().unwrap().bundle().access_token(), "fresh");

    h.assert_recorded_len(0);
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn http_authenticator__client_credentials_grant_wire_shape() {
    let (transport, h) = mock()
        .replies([MockReply::ok_json(json_bytes(&json!({
            "access_token": "granted",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "library-read library-modify"
        })))])
        .build();

    let authenticator = HttpAuthenticator::new(
        Arc::new(transport),
        url::Url::parse("https://accounts.example.com/api/token").unwrap(),
        "id",
        "secret",
    );

    let bundle = authenticator.client_credentials().await.unwrap();
    assert_eq!(bundle.access_token(), "granted");
    assert_eq!(bundle.refresh_token(), None);
    assert!(bundle.has_scope("library-modify"));

    let reqs = h.recorded();
    assert_request(&reqs[0])
        .method(http::Method::POST)
        .host("accounts.example.com")
        .path("/api/token")
        // base64("id:secret")
        .header("authorization", "Basic aWQ6c2VjcmV0")
        .header("content-type", "application/x-www-form-urlencoded")
        .body_present();
    assert_eq!(
        reqs[0].body.as_ref().map(|b| &b[..]),
        Some(&b"grant_type=client_credentials"[..])
    );
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn http_authenticator__refresh_uses_the_refresh_token_grant() {
    let (transport, h) = mock()
        .replies([MockReply::ok_json(json_bytes(&json!({
            "access_token": "rotated",
            "token_type": "Bearer",
            "expires_in": 3600
        })))])
        .build();

    let authenticator = HttpAuthenticator::new(
        Arc::new(transport),
        url::Url::parse("https://accounts.example.com/api/token").unwrap(),
        "id",
        "secret",
    );

    let current = expired_bundle();
    let resp = authenticator.refresh(&current).await.unwrap();
    assert_eq!(resp.access_token, "rotated");

    let reqs = h.recorded();
    assert_eq!(
        reqs[0].body.as_ref().map(|b| &b[..]),
        Some(&b"grant_type=refresh_token&refresh_token=refresh-me"[..])
    );
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn refresh__preserves_refresh_token_and_fires_hooks() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (transport, h) = mock()
        .replies([MockReply::ok_json(json_bytes(&json!([1])))])
        .build();

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let auth = AuthRuntime::new(expired_bundle(), counting_authenticator(calls));
    let seen2 = seen.clone();
    auth.on_refresh(move |bundle| {
        seen2.lock().push(bundle.access_token().to_string());
    });

    let api = ApiClient::with_transport("https://api.example.com/v1", transport)
        .unwrap()
        .with_auth(auth);

    api.get::<Vec<u32>>("a").run().await.unwrap();

    let auth = api.auth().unwrap();
    assert_eq!(auth.state(), TokenState::Valid);
    assert_eq!(auth.bundle().access_token(), "fresh");
    // The response carried no refresh token; the prior one survives.
    assert_eq!(auth.bundle().refresh_token(), Some("refresh-me"));
    assert_eq!(seen.lock().as_slice(), &["fresh".to_string()]);

    h.finish();
}
