use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlaylistRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 300))]
    pub description: String,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub track_uris: Vec<String>,
}

/// Playlist identity after normalizing whatever shape the upstream answered with.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedPlaylist {
    pub id: String,
    pub url: String,
}

/// Returned once to the caller; never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlaylistCreationResult {
    pub playlist_id: String,
    pub name: String,
    pub url: String,
    pub tracks_requested: usize,
    pub tracks_added: usize,
}
