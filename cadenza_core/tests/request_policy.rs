use cadenza_core::prelude::*;
use cadenza_test_support::*;
use http::{Method, StatusCode};
use serde_json::json;
use std::time::Duration;

fn client(transport: MockTransport) -> ApiClient<MockTransport> {
    let c = ApiClient::with_transport("https://api.example.com/v1", transport).unwrap();
    c.set_caching_enabled(false);
    c
}

#[tokio::test(flavor = "current_thread")]
async fn accepted__is_retried_exactly_once_then_ok() {
    let (transport, h) = mock()
        .replies([
            MockReply::status(StatusCode::ACCEPTED),
            MockReply::ok_json(json_bytes(&json!([1, 2]))),
        ])
        .build();
    let api = client(transport);

    let out = api.get::<Vec<u32>>("jobs/import").run().await.unwrap();
    assert_eq!(out, vec![1, 2]);

    h.assert_recorded_len(2);
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn accepted__second_202_is_final() {
    let (transport, h) = mock()
        .replies([
            MockReply::status(StatusCode::ACCEPTED),
            MockReply::status_json(StatusCode::ACCEPTED, json_bytes(&json!([9]))),
        ])
        .build();
    let api = client(transport);

    // Still a 2xx, so the second response's body is the result; no third
    // attempt happens.
    let out = api.get::<Vec<u32>>("jobs/import").run().await.unwrap();
    assert_eq!(out, vec![9]);

    h.assert_recorded_len(2);
    h.finish();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn rate_limited__honors_retry_after_then_succeeds() {
    let (transport, h) = mock()
        .replies([
            MockReply::status(StatusCode::TOO_MANY_REQUESTS).with_retry_after(3),
            MockReply::ok_json(json_bytes(&json!([1]))),
        ])
        .build();
    let api = client(transport);

    let out = api.get::<Vec<u32>>("tracks/hot").run().await.unwrap();
    assert_eq!(out, vec![1]);

    h.assert_recorded_len(2);
    h.finish();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn rate_limited__gives_up_after_two_extra_attempts() {
    let (transport, h) = mock()
        .replies([
            MockReply::status(StatusCode::TOO_MANY_REQUESTS),
            MockReply::status(StatusCode::TOO_MANY_REQUESTS),
            MockReply::status_json(
                StatusCode::TOO_MANY_REQUESTS,
                json_bytes(&json!({"status": 429, "message": "slow down"})),
            ),
        ])
        .build();
    let api = client(transport);

    let err = api.get::<Vec<u32>>("tracks/hot").run().await.unwrap_err();
    match err {
        Error::BadRequest { status, message, .. } => {
            assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
            assert_eq!(message, "slow down");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    h.assert_recorded_len(3);
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn rate_limited__retry_can_be_disabled() {
    let (transport, h) = mock()
        .replies([MockReply::status(StatusCode::TOO_MANY_REQUESTS)])
        .build();
    let api = ApiClient::with_transport("https://api.example.com/v1", transport)
        .unwrap()
        .retry_rate_limited(false);

    let err = api.get::<Vec<u32>>("tracks/hot").run().await.unwrap_err();
    assert!(
        matches!(err, Error::BadRequest { status, .. } if status == StatusCode::TOO_MANY_REQUESTS)
    );

    h.assert_recorded_len(1);
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn errors__body_decodes_into_status_message_reason() {
    let (transport, h) = mock()
        .replies([MockReply::status_json(
            StatusCode::NOT_FOUND,
            json_bytes(&json!({"status": 404, "message": "non existing id", "reason": "NO_SUCH_ALBUM"})),
        )])
        .build();
    let api = client(transport);

    let err = api.get::<Vec<u32>>("albums/nope").run().await.unwrap_err();
    match err {
        Error::BadRequest {
            status,
            message,
            reason,
        } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(message, "non existing id");
            assert_eq!(reason.as_deref(), Some("NO_SUCH_ALBUM"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn errors__401_maps_to_authentication() {
    let (transport, h) = mock()
        .replies([MockReply::status_json(
            StatusCode::UNAUTHORIZED,
            json_bytes(&json!({"status": 401, "message": "token expired"})),
        )])
        .build();
    let api = client(transport);

    let err = api.get::<Vec<u32>>("me").run().await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn lookup__not_found_becomes_none_only_for_optional_gets() {
    let (transport, h) = mock()
        .replies([
            MockReply::status_json(
                StatusCode::NOT_FOUND,
                json_bytes(&json!({"status": 404, "message": "gone"})),
            ),
            MockReply::ok_json(json_bytes(&json!([7]))),
        ])
        .build();
    let api = client(transport);

    let missing = api.get_optional::<Vec<u32>>("albums/gone").run().await.unwrap();
    assert_eq!(missing, None);

    let present = api.get_optional::<Vec<u32>>("albums/here").run().await.unwrap();
    assert_eq!(present, Some(vec![7]));

    h.assert_recorded_len(2);
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn requests__carry_accept_header_and_default_timeout() {
    let (transport, h) = mock()
        .replies([MockReply::ok_json(json_bytes(&json!([1])))])
        .build();
    let api = client(transport);

    api.get::<Vec<u32>>("tracks/1").run().await.unwrap();

    assert_request(&h.recorded()[0])
        .method(Method::GET)
        .host("api.example.com")
        .path("/v1/tracks/1")
        .header("accept", "application/json")
        .header_absent("content-type")
        .body_absent()
        .timeout(Some(Duration::from_secs(30)));
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn requests__json_body_sets_content_type() {
    let (transport, h) = mock()
        .replies([MockReply::status(StatusCode::CREATED)])
        .build();
    let api = client(transport);

    let body = Json::encode(&json!({"name": "road trip"})).unwrap();
    api.request_empty(Method::POST, "me/playlists", Some(body))
        .run()
        .await
        .unwrap();

    assert_request(&h.recorded()[0])
        .method(Method::POST)
        .path("/v1/me/playlists")
        .header("content-type", "application/json")
        .body_present();
    h.finish();
}
