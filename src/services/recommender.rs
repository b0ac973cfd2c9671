use crate::error::Result;
use crate::models::Track;
use crate::services::library_pager::LibraryPager;
use crate::services::mood_mapper::{LibraryStage, SearchStage, TrackSelectionStrategy};
use crate::services::spotify::{SpotifyService, SpotifySession};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upstream cap on ids per audio-features request.
const FEATURES_BATCH: usize = 100;

/// Upstream cap on results per search request.
const SEARCH_PAGE_LIMIT: usize = 50;

/// Executes a [`TrackSelectionStrategy`] against the user's account.
pub struct Recommender {
    spotify: Arc<SpotifyService>,
    library: Arc<LibraryPager>,
}

impl Recommender {
    pub fn new(spotify: Arc<SpotifyService>, library: Arc<LibraryPager>) -> Self {
        Self { spotify, library }
    }

    pub async fn select(&self, user_id: &str, strategy: &TrackSelectionStrategy) -> Result<Vec<Track>> {
        let mut session = self.spotify.open_session(user_id).await?;
        self.select_with(&mut session, strategy).await
    }

    /// Tracks in playlist order, unique by id. May return fewer than requested
    /// when the catalogue or library has too few matches.
    pub async fn select_with(
        &self,
        session: &mut SpotifySession,
        strategy: &TrackSelectionStrategy,
    ) -> Result<Vec<Track>> {
        debug!(
            "Selecting {} tracks opening with {:?} for user {}",
            strategy.total_count(),
            strategy.opening_category(),
            session.user_id()
        );

        let tracks = match strategy {
            TrackSelectionStrategy::SearchByMoodTerms(stages) => self.from_search(session, stages).await?,
            TrackSelectionStrategy::SelectFromLibrary(stages) => self.from_library(session, stages).await?,
        };

        if tracks.len() < strategy.total_count() {
            warn!(
                "Selected {} of {} requested tracks for user {}",
                tracks.len(),
                strategy.total_count(),
                session.user_id()
            );
        } else {
            info!("Selected {} tracks for user {}", tracks.len(), session.user_id());
        }
        Ok(tracks)
    }

    async fn from_search(&self, session: &mut SpotifySession, stages: &[SearchStage]) -> Result<Vec<Track>> {
        let mut selected = Vec::new();
        let mut seen = HashSet::new();

        for stage in stages {
            let mut taken = 0;
            let per_query = stage.count.clamp(1, SEARCH_PAGE_LIMIT) as u32;

            for term in &stage.terms {
                if taken >= stage.count {
                    break;
                }
                let results = session.search_tracks(term, per_query).await?;
                debug!("Search '{}' returned {} tracks", term, results.len());

                for track in results {
                    if taken >= stage.count {
                        break;
                    }
                    if seen.insert(track.id.clone()) {
                        selected.push(track);
                        taken += 1;
                    }
                }
            }

            debug!("{:?} stage: {} of {} tracks", stage.category, taken, stage.count);
        }

        Ok(selected)
    }

    async fn from_library(&self, session: &mut SpotifySession, stages: &[LibraryStage]) -> Result<Vec<Track>> {
        let library = self.library.fetch_all_with(session).await?;
        if library.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = library.iter().map(|t| t.id.clone()).collect();
        let mut features = HashMap::with_capacity(ids.len());
        for batch in ids.chunks(FEATURES_BATCH) {
            features.extend(session.audio_features(batch).await?);
        }
        debug!(
            "Audio features available for {} of {} library tracks",
            features.len(),
            library.len()
        );

        let mut used = HashSet::new();
        let mut selected = Vec::new();

        for stage in stages {
            let mut candidates: Vec<(&Track, f32)> = library
                .iter()
                .filter(|t| !used.contains(&t.id))
                .filter_map(|t| {
                    let f = features.get(&t.id)?;
                    stage
                        .filter
                        .matches(f.valence, f.energy)
                        .then(|| (t, stage.filter.distance(f.valence, f.energy)))
                })
                .collect();
            candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

            for (track, _) in candidates.into_iter().take(stage.count) {
                used.insert(track.id.clone());
                selected.push(track.clone());
            }
        }

        Ok(selected)
    }
}
