use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Output of the sentiment scorer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct SentimentResult {
    #[validate(range(min = -1.0, max = 1.0))]
    pub score: f32,
    pub label: String,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence: f32,
}

/// Mood buckets, ordered from most negative to most uplifting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MoodCategory {
    Low,
    Calm,
    Neutral,
    Happy,
    Excited,
}

impl MoodCategory {
    pub const ALL: [MoodCategory; 5] = [
        MoodCategory::Low,
        MoodCategory::Calm,
        MoodCategory::Neutral,
        MoodCategory::Happy,
        MoodCategory::Excited,
    ];

    pub fn from_score(score: f32) -> Self {
        match score {
            s if s < -0.5 => MoodCategory::Low,
            s if s < -0.1 => MoodCategory::Calm,
            s if s < 0.3 => MoodCategory::Neutral,
            s if s < 0.65 => MoodCategory::Happy,
            _ => MoodCategory::Excited,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" | "sad" | "negative" => Some(MoodCategory::Low),
            "calm" => Some(MoodCategory::Calm),
            "neutral" => Some(MoodCategory::Neutral),
            "happy" | "positive" => Some(MoodCategory::Happy),
            "excited" => Some(MoodCategory::Excited),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MoodCategory::Low => "Low",
            MoodCategory::Calm => "Calm",
            MoodCategory::Neutral => "Neutral",
            MoodCategory::Happy => "Happy",
            MoodCategory::Excited => "Excited",
        }
    }

    /// Next category toward the uplifting end, if any.
    pub fn brighter(&self) -> Option<Self> {
        let idx = Self::ALL.iter().position(|c| c == self)?;
        Self::ALL.get(idx + 1).copied()
    }
}

impl SentimentResult {
    /// The label wins when it names a known bucket; otherwise fall back to the score.
    pub fn category(&self) -> MoodCategory {
        MoodCategory::from_label(&self.label).unwrap_or_else(|| MoodCategory::from_score(self.score))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    #[default]
    Search,
    Library,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistShape {
    /// Only tracks matching the current mood.
    Single,
    /// Start at the current mood, then trend toward a brighter one.
    #[default]
    GradualUplift,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeMoodRequest {
    #[validate(length(min = 1, max = 5000))]
    pub text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LogMoodRequest {
    #[validate(length(min = 1, max = 5000))]
    pub text: String,
    #[validate(range(min = -1.0, max = 1.0))]
    pub sentiment_score: f32,
    #[validate(length(min = 1, max = 50))]
    pub sentiment_label: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MoodLogEntry {
    pub id: Uuid,
    pub user_id: String,
    pub text: String,
    pub sentiment_score: f32,
    pub sentiment_label: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecommendationRequest {
    #[serde(flatten)]
    pub sentiment: SentimentResult,
    #[serde(default)]
    pub source: TrackSource,
    #[serde(default)]
    pub shape: PlaylistShape,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 300))]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_score_thresholds() {
        assert_eq!(MoodCategory::from_score(-0.7), MoodCategory::Low);
        assert_eq!(MoodCategory::from_score(-0.3), MoodCategory::Calm);
        assert_eq!(MoodCategory::from_score(0.1), MoodCategory::Neutral);
        assert_eq!(MoodCategory::from_score(0.5), MoodCategory::Happy);
        assert_eq!(MoodCategory::from_score(0.8), MoodCategory::Excited);
    }

    #[test]
    fn label_takes_precedence_over_score() {
        let sentiment = SentimentResult {
            score: 0.9,
            label: "Low".into(),
            confidence: 0.8,
        };
        assert_eq!(sentiment.category(), MoodCategory::Low);

        let unknown = SentimentResult {
            score: 0.9,
            label: "meh".into(),
            confidence: 0.8,
        };
        assert_eq!(unknown.category(), MoodCategory::Excited);
    }

    #[test]
    fn recommendation_request_flattens_sentiment() {
        let req: RecommendationRequest = serde_json::from_str(
            r#"{"score": -0.7, "label": "Low", "confidence": 0.85, "source": "library"}"#,
        )
        .unwrap();

        assert_eq!(req.sentiment.category(), MoodCategory::Low);
        assert_eq!(req.source, TrackSource::Library);
        assert_eq!(req.shape, PlaylistShape::GradualUplift);
        assert!(req.limit.is_none());
    }
}
