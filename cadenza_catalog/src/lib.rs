mod client;
mod model;

pub use client::CatalogClient;
pub use model::{
    Album, Artist, ArtistRef, Playlist, PlaylistItem, SavedAlbum, Track, User,
};
