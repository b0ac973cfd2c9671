use crate::error::{AppError, Result};
use crate::models::Track;
use crate::services::spotify::{SpotifyService, SpotifySession};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Walks the user's saved-tracks listing to the end.
pub struct LibraryPager {
    spotify: Arc<SpotifyService>,
    page_size: u32,
    /// Total wall-clock allowance for one full walk.
    budget: Duration,
}

impl LibraryPager {
    pub fn new(spotify: Arc<SpotifyService>, page_size: u32, budget: Duration) -> Self {
        Self {
            spotify,
            page_size: page_size.max(1),
            budget,
        }
    }

    pub async fn fetch_all(&self, user_id: &str) -> Result<Vec<Track>> {
        let mut session = self.spotify.open_session(user_id).await?;
        self.fetch_all_with(&mut session).await
    }

    /// Ordered, de-duplicated library. Fails instead of truncating when a page
    /// is malformed or the budget runs out.
    pub async fn fetch_all_with(&self, session: &mut SpotifySession) -> Result<Vec<Track>> {
        let user_id = session.user_id().to_string();

        match tokio::time::timeout(self.budget, self.collect(session)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Library fetch for user {} exceeded {:?} budget, aborting",
                    user_id, self.budget
                );
                Err(AppError::UpstreamTimeout(format!(
                    "library fetch exceeded {}s",
                    self.budget.as_secs()
                )))
            }
        }
    }

    async fn collect(&self, session: &mut SpotifySession) -> Result<Vec<Track>> {
        let mut tracks = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = 0;
        let mut pages = 0;

        info!("Fetching saved tracks for user {}", session.user_id());

        loop {
            let page = session.saved_tracks(self.page_size, offset).await?;
            pages += 1;

            let items = page.items.ok_or_else(|| {
                error!(
                    "Saved tracks page {} (offset {}) for user {} has no item list",
                    pages,
                    offset,
                    session.user_id()
                );
                AppError::UpstreamMalformed(format!(
                    "saved tracks page at offset {} has no item list",
                    offset
                ))
            })?;

            for track in items {
                if seen.insert(track.id.clone()) {
                    tracks.push(track);
                }
            }

            debug!(
                "Page {} at offset {}: {} entries, {} unique tracks so far",
                pages, offset, page.page_len, tracks.len()
            );

            if page.page_len < self.page_size as usize || !page.has_more {
                break;
            }
            offset += self.page_size;
        }

        info!(
            "Fetched {} saved tracks in {} page(s) for user {}",
            tracks.len(),
            pages,
            session.user_id()
        );
        Ok(tracks)
    }
}
