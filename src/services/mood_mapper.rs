//! Mood to Track Selection
//!
//! Turns a sentiment result into a plan for picking tracks. Plans follow the
//! ISO principle: the first tracks match the listener's current mood, and a
//! gradual-uplift plan then steps one category brighter at a time.
//!
//! Strategy:
//! 1. Resolve the current mood category (label first, score as fallback)
//! 2. Build the stage path: current category, then brighter ones up to Happy
//! 3. Split the requested track count across the stages, current mood first
//! 4. Attach search terms or an audio-feature window to each stage

use crate::models::{MoodCategory, PlaylistShape, SentimentResult, TrackSource};
use serde::Serialize;

/// Uplift never goes past this; Excited is only used when the listener is already there.
const UPLIFT_TARGET: MoodCategory = MoodCategory::Happy;

pub const DEFAULT_TRACK_LIMIT: usize = 20;
pub const MAX_TRACK_LIMIT: usize = 100;

/// Window on Spotify's valence and energy scales for one mood category.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct FeatureRange {
    pub valence: (f32, f32),
    pub energy: (f32, f32),
}

impl FeatureRange {
    pub fn for_category(category: MoodCategory) -> Self {
        let (valence, energy) = match category {
            MoodCategory::Low => ((0.0, 0.35), (0.0, 0.5)),
            MoodCategory::Calm => ((0.25, 0.55), (0.0, 0.45)),
            MoodCategory::Neutral => ((0.4, 0.65), (0.3, 0.65)),
            MoodCategory::Happy => ((0.6, 1.0), (0.45, 0.85)),
            MoodCategory::Excited => ((0.65, 1.0), (0.75, 1.0)),
        };
        Self { valence, energy }
    }

    pub fn matches(&self, valence: f32, energy: f32) -> bool {
        within(valence, self.valence) && within(energy, self.energy)
    }

    /// Distance from the window's centre; smaller is a better fit.
    pub fn distance(&self, valence: f32, energy: f32) -> f32 {
        let dv = valence - midpoint(self.valence);
        let de = energy - midpoint(self.energy);
        (dv * dv + de * de).sqrt()
    }
}

fn within(value: f32, (lo, hi): (f32, f32)) -> bool {
    value >= lo && value <= hi
}

fn midpoint((lo, hi): (f32, f32)) -> f32 {
    (lo + hi) / 2.0
}

/// Search phrases that tend to surface tracks of the given mood.
pub fn search_terms(category: MoodCategory) -> &'static [&'static str] {
    match category {
        MoodCategory::Low => &["sad songs", "melancholy", "heartbreak", "rainy day"],
        MoodCategory::Calm => &["chill", "acoustic calm", "lofi", "peaceful"],
        MoodCategory::Neutral => &["indie", "easy listening", "mellow pop", "feel good acoustic"],
        MoodCategory::Happy => &["happy", "feel good", "upbeat pop", "sunny"],
        MoodCategory::Excited => &["party", "dance hits", "energetic", "workout"],
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchStage {
    pub category: MoodCategory,
    pub terms: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LibraryStage {
    pub category: MoodCategory,
    pub filter: FeatureRange,
    pub count: usize,
}

/// Ordered plan; stage order is playlist order.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "stages", rename_all = "snake_case")]
pub enum TrackSelectionStrategy {
    SearchByMoodTerms(Vec<SearchStage>),
    SelectFromLibrary(Vec<LibraryStage>),
}

impl TrackSelectionStrategy {
    /// Category of the first stage, i.e. what the playlist opens with.
    pub fn opening_category(&self) -> Option<MoodCategory> {
        match self {
            TrackSelectionStrategy::SearchByMoodTerms(stages) => stages.first().map(|s| s.category),
            TrackSelectionStrategy::SelectFromLibrary(stages) => stages.first().map(|s| s.category),
        }
    }

    pub fn total_count(&self) -> usize {
        match self {
            TrackSelectionStrategy::SearchByMoodTerms(stages) => stages.iter().map(|s| s.count).sum(),
            TrackSelectionStrategy::SelectFromLibrary(stages) => stages.iter().map(|s| s.count).sum(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MoodMapper;

impl MoodMapper {
    pub fn new() -> Self {
        Self
    }

    pub fn map(
        &self,
        sentiment: &SentimentResult,
        source: TrackSource,
        shape: PlaylistShape,
        limit: usize,
    ) -> TrackSelectionStrategy {
        let limit = limit.clamp(1, MAX_TRACK_LIMIT);
        let path = stage_path(sentiment.category(), shape, limit);
        let counts = split_counts(limit, path.len());

        match source {
            TrackSource::Search => TrackSelectionStrategy::SearchByMoodTerms(
                path.iter()
                    .zip(counts)
                    .map(|(&category, count)| SearchStage {
                        category,
                        terms: search_terms(category).iter().map(|t| t.to_string()).collect(),
                        count,
                    })
                    .collect(),
            ),
            TrackSource::Library => TrackSelectionStrategy::SelectFromLibrary(
                path.iter()
                    .zip(counts)
                    .map(|(&category, count)| LibraryStage {
                        category,
                        filter: FeatureRange::for_category(category),
                        count,
                    })
                    .collect(),
            ),
        }
    }
}

fn stage_path(current: MoodCategory, shape: PlaylistShape, limit: usize) -> Vec<MoodCategory> {
    let mut path = vec![current];

    if shape == PlaylistShape::GradualUplift {
        let mut next = current;
        while next < UPLIFT_TARGET {
            match next.brighter() {
                Some(brighter) => {
                    path.push(brighter);
                    next = brighter;
                }
                None => break,
            }
        }
    }

    // Every stage needs at least one track
    path.truncate(limit);
    path
}

/// Even split, remainder to the first stage so the opening mood dominates.
fn split_counts(total: usize, stages: usize) -> Vec<usize> {
    if stages == 0 {
        return Vec::new();
    }
    let base = total / stages;
    let mut counts = vec![base; stages];
    counts[0] += total % stages;
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentiment(score: f32, label: &str) -> SentimentResult {
        SentimentResult {
            score,
            label: label.to_string(),
            confidence: 0.8,
        }
    }

    #[test]
    fn low_mood_opens_with_low_tracks_and_never_jumps_to_excited() {
        let mapper = MoodMapper::new();
        let strategy = mapper.map(
            &sentiment(-0.8, "Low"),
            TrackSource::Library,
            PlaylistShape::GradualUplift,
            20,
        );

        assert_eq!(strategy.opening_category(), Some(MoodCategory::Low));
        let TrackSelectionStrategy::SelectFromLibrary(stages) = strategy else {
            panic!("expected library strategy");
        };
        let first = &stages[0];
        assert!(first.filter.valence.1 <= 0.35);
        assert!(stages.iter().all(|s| s.category != MoodCategory::Excited));
        assert_eq!(
            stages.iter().map(|s| s.category).collect::<Vec<_>>(),
            vec![
                MoodCategory::Low,
                MoodCategory::Calm,
                MoodCategory::Neutral,
                MoodCategory::Happy
            ]
        );
    }

    #[test]
    fn low_search_terms_match_current_mood() {
        let strategy = MoodMapper::new().map(
            &sentiment(-0.8, "Low"),
            TrackSource::Search,
            PlaylistShape::GradualUplift,
            20,
        );

        let TrackSelectionStrategy::SearchByMoodTerms(stages) = strategy else {
            panic!("expected search strategy");
        };
        assert!(stages[0].terms.contains(&"sad songs".to_string()));
        assert!(!stages[0].terms.contains(&"party".to_string()));
    }

    #[test]
    fn single_shape_stays_on_current_mood() {
        let strategy = MoodMapper::new().map(
            &sentiment(-0.3, "Calm"),
            TrackSource::Search,
            PlaylistShape::Single,
            15,
        );

        let TrackSelectionStrategy::SearchByMoodTerms(stages) = strategy else {
            panic!("expected search strategy");
        };
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].category, MoodCategory::Calm);
        assert_eq!(stages[0].count, 15);
    }

    #[test]
    fn counts_sum_to_limit_with_remainder_up_front() {
        let strategy = MoodMapper::new().map(
            &sentiment(-0.8, "Low"),
            TrackSource::Search,
            PlaylistShape::GradualUplift,
            22,
        );

        assert_eq!(strategy.total_count(), 22);
        let TrackSelectionStrategy::SearchByMoodTerms(stages) = strategy else {
            panic!("expected search strategy");
        };
        assert_eq!(
            stages.iter().map(|s| s.count).collect::<Vec<_>>(),
            vec![7, 5, 5, 5]
        );
    }

    #[test]
    fn tiny_limit_keeps_opening_stage_only() {
        let strategy = MoodMapper::new().map(
            &sentiment(-0.8, "Low"),
            TrackSource::Search,
            PlaylistShape::GradualUplift,
            1,
        );

        assert_eq!(strategy.total_count(), 1);
        assert_eq!(strategy.opening_category(), Some(MoodCategory::Low));
    }

    #[test]
    fn already_bright_moods_are_not_pushed_further() {
        let excited = MoodMapper::new().map(
            &sentiment(0.9, "Excited"),
            TrackSource::Search,
            PlaylistShape::GradualUplift,
            10,
        );
        let TrackSelectionStrategy::SearchByMoodTerms(stages) = excited else {
            panic!("expected search strategy");
        };
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].category, MoodCategory::Excited);
    }

    #[test]
    fn unknown_label_falls_back_to_score() {
        let strategy = MoodMapper::new().map(
            &sentiment(0.1, "whatever"),
            TrackSource::Library,
            PlaylistShape::Single,
            5,
        );
        assert_eq!(strategy.opening_category(), Some(MoodCategory::Neutral));
    }

    #[test]
    fn feature_ranges_fit_their_own_centres() {
        for category in MoodCategory::ALL {
            let range = FeatureRange::for_category(category);
            let (v, e) = (midpoint(range.valence), midpoint(range.energy));
            assert!(range.matches(v, e));
            assert!(range.distance(v, e) < 1e-6);
        }
        assert!(!FeatureRange::for_category(MoodCategory::Low).matches(0.9, 0.9));
    }
}
