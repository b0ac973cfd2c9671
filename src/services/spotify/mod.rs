//! Spotify Web API integration.
//!
//! Upstream access goes through two seams so the rest of the crate never
//! touches HTTP directly:
//!
//! - [`TokenEndpoint`] for the accounts service (authorize URL, code exchange, refresh)
//! - [`SpotifyApi`] for Web API calls, each taking the access token explicitly
//!
//! [`client::SpotifyClient`] implements both over `reqwest`. Callers normally
//! go through a request-scoped [`session::SpotifySession`], which owns the
//! resolved token and applies the retry policy.

pub mod client;
pub mod session;

use crate::error::Result;
use crate::models::{AudioFeatures, CreatedPlaylist, Device, SpotifyProfile, Track};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

pub use client::SpotifyClient;
pub use session::{SpotifyService, SpotifySession};

/// Scopes requested during the connect flow.
pub const SCOPES: &[&str] = &[
    "user-read-private",
    "user-read-email",
    "user-library-read",
    "user-top-read",
    "playlist-modify-public",
    "playlist-modify-private",
    "user-read-playback-state",
    "user-modify-playback-state",
];

/// Bearer token for one user. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Result of a code exchange or refresh against the accounts service.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Only present when the upstream rotates the refresh token.
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

/// One page of the saved-tracks listing.
#[derive(Debug, Clone)]
pub struct SavedTracksPage {
    /// `None` when the upstream omitted the item list entirely.
    pub items: Option<Vec<Track>>,
    /// Raw entry count, including entries that could not be turned into tracks.
    pub page_len: usize,
    /// False once the upstream signals the end of the collection.
    pub has_more: bool,
}

#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    fn authorize_url(&self, state: &str) -> Result<String>;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant>;

    /// Fails with `RefreshFailed` when the refresh token is rejected.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

#[async_trait]
pub trait SpotifyApi: Send + Sync {
    async fn current_user(&self, token: &AccessToken) -> Result<SpotifyProfile>;

    async fn saved_tracks(&self, token: &AccessToken, limit: u32, offset: u32)
        -> Result<SavedTracksPage>;

    async fn top_tracks(&self, token: &AccessToken, limit: u32, time_range: &str)
        -> Result<Vec<Track>>;

    async fn search_tracks(&self, token: &AccessToken, query: &str, limit: u32)
        -> Result<Vec<Track>>;

    /// Tracks without analysis are absent from the map.
    async fn audio_features(
        &self,
        token: &AccessToken,
        track_ids: &[String],
    ) -> Result<HashMap<String, AudioFeatures>>;

    /// Not idempotent: every successful call creates a new playlist.
    async fn create_playlist(
        &self,
        token: &AccessToken,
        owner_id: &str,
        name: &str,
        description: &str,
    ) -> Result<CreatedPlaylist>;

    async fn add_tracks(&self, token: &AccessToken, playlist_id: &str, uris: &[String])
        -> Result<()>;

    async fn devices(&self, token: &AccessToken) -> Result<Vec<Device>>;

    /// Starts `uri` on `device_id`, or on the active device when `None`.
    /// Fails with `NotFound` when there is no device to play on.
    async fn play(&self, token: &AccessToken, uri: &str, device_id: Option<&str>) -> Result<()>;
}
