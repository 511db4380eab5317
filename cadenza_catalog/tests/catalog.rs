use cadenza_catalog::CatalogClient;
use cadenza_core::prelude::*;
use cadenza_test_support::*;
use http::{Method, StatusCode};
use serde_json::json;

fn catalog(transport: MockTransport) -> CatalogClient<MockTransport> {
    let api = ApiClient::with_transport("https://api.example.com/v1", transport).unwrap();
    api.set_caching_enabled(false);
    CatalogClient::new(api)
}

fn album_json(id: &str, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "artists": [{"id": "ar1", "name": "The Strand"}],
        "release_date": "2003-10-07",
        "total_tracks": 11
    })
}

#[tokio::test(flavor = "current_thread")]
async fn album__parses_model_and_unknown_id_is_none() {
    let (transport, h) = mock()
        .replies([
            MockReply::ok_json(json_bytes(&album_json("al1", "Room on Fire"))),
            MockReply::status_json(
                StatusCode::NOT_FOUND,
                json_bytes(&json!({"status": 404, "message": "non existing id"})),
            ),
        ])
        .build();
    let cat = catalog(transport);

    let album = cat.album("al1").run().await.unwrap().unwrap();
    assert_eq!(album.name, "Room on Fire");
    assert_eq!(album.artists[0].name, "The Strand");
    assert_eq!(album.total_tracks, 11);

    let missing = cat.album("nope").run().await.unwrap();
    assert!(missing.is_none());

    h.assert_recorded_len(2);
    assert_request(&h.recorded()[0]).path("/v1/albums/al1");
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn albums__unwraps_the_envelope() {
    let (transport, h) = mock()
        .replies([MockReply::ok_json(json_bytes(&json!({
            "albums": [album_json("al1", "One"), album_json("al2", "Two")]
        })))])
        .build();
    let cat = catalog(transport);

    let albums = cat.albums(&["al1", "al2"]).run().await.unwrap();
    assert_eq!(albums.len(), 2);
    assert_eq!(albums[1].name, "Two");

    assert_request(&h.recorded()[0])
        .path("/v1/albums")
        .query_has("ids", "al1,al2");
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn search__query_is_percent_encoded_and_pages_traverse() {
    let base = "https://api.example.com/v1/search/tracks";
    let track = |id: &str| {
        json!({"id": id, "name": id, "duration_ms": 1000, "explicit": false, "artists": []})
    };
    let (transport, h) = mock()
        .replies([
            MockReply::ok_json(json_bytes(&json!({
                "href": format!("{base}?q=daft+punk&limit=1"),
                "items": [track("t1")],
                "limit": 1,
                "next": format!("{base}?q=daft+punk&limit=1&offset=1"),
                "previous": null,
                "offset": 0,
                "total": 2
            }))),
            MockReply::ok_json(json_bytes(&json!({
                "href": format!("{base}?q=daft+punk&limit=1&offset=1"),
                "items": [track("t2")],
                "limit": 1,
                "next": null,
                "previous": format!("{base}?q=daft+punk&limit=1"),
                "offset": 1,
                "total": 2
            }))),
        ])
        .build();
    let cat = catalog(transport);

    let page = cat.search_tracks("daft punk", 1).run().await.unwrap();
    let all = page.all_items().run().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].id, "t2");

    assert_request(&h.recorded()[0])
        .path("/v1/search/tracks")
        .query_has("q", "daft punk")
        .query_has("limit", "1");
    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn saved_albums__cursor_page_is_forward_only() {
    let (transport, h) = mock()
        .replies([MockReply::ok_json(json_bytes(&json!({
            "href": "https://api.example.com/v1/me/albums?limit=2",
            "items": [
                {"added_at": "2024-01-01T00:00:00Z", "album": album_json("al1", "One")}
            ],
            "limit": 2,
            "next": null,
            "cursors": {},
            "total": 1
        })))])
        .build();
    let cat = catalog(transport);

    let page = cat.saved_albums(2).run().await.unwrap();
    assert_eq!(page.items()[0].album.id, "al1");
    assert!(page.next_action().is_none());
    assert!(page.previous_action().is_err());

    h.finish();
}

#[tokio::test(flavor = "current_thread")]
async fn follow__uses_put_and_never_touches_the_cache() {
    let (transport, h) = mock()
        .replies([
            MockReply::status(StatusCode::NO_CONTENT),
            MockReply::status(StatusCode::NO_CONTENT),
        ])
        .build();
    let api = ApiClient::with_transport("https://api.example.com/v1", transport).unwrap();
    let cat = CatalogClient::new(api);

    let action = cat.follow_artists(&["ar1", "ar2"]);
    action.run().await.unwrap();
    action.run().await.unwrap();

    // Caching is enabled on this client, yet both runs hit the transport.
    h.assert_recorded_len(2);
    assert!(cat.api().cache().is_empty());

    assert_request(&h.recorded()[0])
        .method(Method::PUT)
        .path("/v1/me/following")
        .query_has("type", "artist")
        .query_has("ids", "ar1,ar2");
    h.finish();
}
