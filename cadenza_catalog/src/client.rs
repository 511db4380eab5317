use crate::model::{Album, Artist, Playlist, PlaylistItem, SavedAlbum, Track, User};
use cadenza_core::prelude::{
    Action, ApiClient, CursorPage, Page, ReqwestTransport, Transport,
};
use http::Method;
use serde::Deserialize;

#[derive(Deserialize)]
struct AlbumsEnvelope {
    albums: Vec<Album>,
}

#[derive(Deserialize)]
struct ArtistsEnvelope {
    artists: Vec<Artist>,
}

/// Typed catalog surface. Every method defers to the engine: it builds an
/// `Action` and leaves the caller to decide when and how to run it.
pub struct CatalogClient<T: Transport = ReqwestTransport> {
    api: ApiClient<T>,
}

impl<T: Transport> CatalogClient<T> {
    pub fn new(api: ApiClient<T>) -> Self {
        Self { api }
    }

    #[inline]
    pub fn api(&self) -> &ApiClient<T> {
        &self.api
    }

    // ---------------- Lookups ----------------

    /// A single album; an unknown id yields `None` rather than an error.
    pub fn album(&self, id: &str) -> Action<Option<Album>> {
        self.api.get_optional(&format!("albums/{id}"))
    }

    pub fn albums(&self, ids: &[&str]) -> Action<Vec<Album>> {
        self.api
            .get::<AlbumsEnvelope>(&format!("albums?ids={}", ids.join(",")))
            .map(|e| e.albums)
    }

    /// A single artist; an unknown id yields `None`.
    pub fn artist(&self, id: &str) -> Action<Option<Artist>> {
        self.api.get_optional(&format!("artists/{id}"))
    }

    pub fn artists(&self, ids: &[&str]) -> Action<Vec<Artist>> {
        self.api
            .get::<ArtistsEnvelope>(&format!("artists?ids={}", ids.join(",")))
            .map(|e| e.artists)
    }

    /// A single track; an unknown id yields `None`.
    pub fn track(&self, id: &str) -> Action<Option<Track>> {
        self.api.get_optional(&format!("tracks/{id}"))
    }

    /// A single playlist; an unknown id yields `None`.
    pub fn playlist(&self, id: &str) -> Action<Option<Playlist>> {
        self.api.get_optional(&format!("playlists/{id}"))
    }

    pub fn me(&self) -> Action<User> {
        self.api.get("me")
    }

    // ---------------- Paginated reads ----------------

    pub fn artist_albums(&self, id: &str, limit: u32) -> Action<Page<Album>> {
        self.api
            .get_page(&format!("artists/{id}/albums?limit={limit}"))
    }

    pub fn playlist_tracks(&self, id: &str, limit: u32) -> Action<Page<PlaylistItem>> {
        self.api
            .get_page(&format!("playlists/{id}/tracks?limit={limit}"))
    }

    pub fn search_tracks(&self, query: &str, limit: u32) -> Action<Page<Track>> {
        self.api.get_page(&format!(
            "search/tracks?q={}&limit={limit}",
            urlencoding::encode(query)
        ))
    }

    pub fn saved_albums(&self, limit: u32) -> Action<CursorPage<SavedAlbum>> {
        self.api.get_cursor_page(&format!("me/albums?limit={limit}"))
    }

    pub fn followed_artists(&self, limit: u32) -> Action<CursorPage<Artist>> {
        self.api
            .get_cursor_page(&format!("me/following?type=artist&limit={limit}"))
    }

    // ---------------- Writes (always bypass the cache) ----------------

    pub fn save_albums(&self, ids: &[&str]) -> Action<()> {
        self.api
            .request_empty(Method::PUT, &format!("me/albums?ids={}", ids.join(",")), None)
    }

    pub fn remove_albums(&self, ids: &[&str]) -> Action<()> {
        self.api.request_empty(
            Method::DELETE,
            &format!("me/albums?ids={}", ids.join(",")),
            None,
        )
    }

    pub fn follow_artists(&self, ids: &[&str]) -> Action<()> {
        self.api.request_empty(
            Method::PUT,
            &format!("me/following?type=artist&ids={}", ids.join(",")),
            None,
        )
    }

    pub fn unfollow_artists(&self, ids: &[&str]) -> Action<()> {
        self.api.request_empty(
            Method::DELETE,
            &format!("me/following?type=artist&ids={}", ids.join(",")),
            None,
        )
    }
}
