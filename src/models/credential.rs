use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// OAuth credential for one local user's Spotify connection.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Credential {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub spotify_user_id: String,
    pub spotify_display_name: Option<String>,
    pub spotify_email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// True while the access token stays valid for at least `margin` more.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

/// Subset of the Spotify `/me` payload we care about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpotifyProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub followers: u64,
    pub images: Vec<String>,
}
