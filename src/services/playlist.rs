use crate::error::{AppError, Result};
use crate::models::PlaylistCreationResult;
use crate::services::spotify::{SpotifyService, SpotifySession};
use std::sync::Arc;
use tracing::{info, warn};

/// Upstream limit on URIs per add-tracks request.
const ADD_TRACKS_BATCH: usize = 100;

const TRACK_URI_PREFIX: &str = "spotify:track:";

/// Creates a playlist in the user's account and fills it.
///
/// Creation errors are returned as-is. Once the playlist exists, population
/// errors only lower `tracks_added`: the caller always gets the playlist back.
pub struct PlaylistOrchestrator {
    spotify: Arc<SpotifyService>,
}

impl PlaylistOrchestrator {
    pub fn new(spotify: Arc<SpotifyService>) -> Self {
        Self { spotify }
    }

    pub async fn create_and_populate(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
        track_uris: &[String],
    ) -> Result<PlaylistCreationResult> {
        let mut session = self.spotify.open_session(user_id).await?;
        self.create_and_populate_with(&mut session, name, description, track_uris)
            .await
    }

    pub async fn create_and_populate_with(
        &self,
        session: &mut SpotifySession,
        name: &str,
        description: &str,
        track_uris: &[String],
    ) -> Result<PlaylistCreationResult> {
        validate_uris(track_uris)?;

        let owner = session.current_user().await?;
        info!(
            "Creating playlist '{}' with {} tracks for Spotify user {}",
            name,
            track_uris.len(),
            owner.id
        );

        let playlist = match session.create_playlist(&owner.id, name, description).await {
            Ok(playlist) => playlist,
            Err(AppError::UpstreamTimeout(detail)) => {
                // The upstream may still have created it; a blind retry could duplicate
                warn!("Playlist creation for user {} timed out: {}", session.user_id(), detail);
                return Err(AppError::UpstreamTimeout(
                    "playlist creation did not complete in time; check your Spotify account before retrying"
                        .to_string(),
                ));
            }
            Err(e) => return Err(e),
        };
        info!("Created playlist {} for user {}", playlist.id, session.user_id());

        let tracks_added = self.populate(session, &playlist.id, track_uris).await;

        Ok(PlaylistCreationResult {
            playlist_id: playlist.id,
            name: name.to_string(),
            url: playlist.url,
            tracks_requested: track_uris.len(),
            tracks_added,
        })
    }

    /// Returns how many URIs made it in. Stops at the first failed batch.
    async fn populate(&self, session: &mut SpotifySession, playlist_id: &str, uris: &[String]) -> usize {
        let mut added = 0;

        for batch in uris.chunks(ADD_TRACKS_BATCH) {
            match session.add_tracks(playlist_id, batch).await {
                Ok(()) => added += batch.len(),
                Err(e) => {
                    warn!(
                        "Failed to add tracks to playlist {} ({} of {} added): {}",
                        playlist_id,
                        added,
                        uris.len(),
                        e
                    );
                    break;
                }
            }
        }

        if added == uris.len() && !uris.is_empty() {
            info!("Added {} tracks to playlist {}", added, playlist_id);
        }
        added
    }
}

fn validate_uris(uris: &[String]) -> Result<()> {
    match uris
        .iter()
        .find(|uri| !uri.starts_with(TRACK_URI_PREFIX) || uri.len() == TRACK_URI_PREFIX.len())
    {
        Some(bad) => Err(AppError::Validation(format!("Invalid track URI: {}", bad))),
        None => Ok(()),
    }
}
