//! Sentiment Scoring
//!
//! The scorer is a seam: handlers only see [`SentimentAnalyzer`]. The bundled
//! [`LexiconAnalyzer`] is a small weighted word list with negation and
//! intensifier handling, good enough to bucket short mood descriptions.

use crate::error::{AppError, Result};
use crate::models::{MoodCategory, SentimentResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<SentimentResult>;
}

/// Word weights on a -4..=4 scale.
const LEXICON: &[(&str, f32)] = &[
    // negative
    ("awful", -3.0),
    ("terrible", -3.0),
    ("horrible", -3.0),
    ("miserable", -3.0),
    ("depressed", -3.0),
    ("devastated", -3.5),
    ("hopeless", -3.0),
    ("heartbroken", -3.5),
    ("sad", -2.0),
    ("unhappy", -2.0),
    ("lonely", -2.0),
    ("down", -1.5),
    ("blue", -1.0),
    ("cry", -2.0),
    ("crying", -2.0),
    ("angry", -2.5),
    ("upset", -2.0),
    ("anxious", -2.0),
    ("stressed", -2.0),
    ("worried", -1.5),
    ("tired", -1.0),
    ("exhausted", -2.0),
    ("bored", -1.0),
    ("bad", -2.0),
    ("hate", -3.0),
    ("lost", -1.5),
    ("hurt", -2.0),
    ("gloomy", -2.0),
    ("meh", -0.5),
    // calm / mildly positive
    ("calm", 0.5),
    ("relaxed", 1.0),
    ("peaceful", 1.5),
    ("okay", 0.5),
    ("ok", 0.5),
    ("fine", 0.5),
    ("chill", 1.0),
    ("content", 1.5),
    // positive
    ("good", 2.0),
    ("nice", 1.5),
    ("happy", 3.0),
    ("glad", 2.0),
    ("great", 3.0),
    ("love", 3.0),
    ("grateful", 2.5),
    ("joy", 3.0),
    ("cheerful", 2.5),
    ("hopeful", 2.0),
    ("proud", 2.0),
    ("fun", 2.0),
    ("amazing", 3.5),
    ("awesome", 3.5),
    ("wonderful", 3.5),
    ("fantastic", 3.5),
    ("excited", 3.5),
    ("thrilled", 3.5),
    ("ecstatic", 4.0),
    ("pumped", 3.0),
    ("energized", 3.0),
    ("energetic", 3.0),
];

const NEGATIONS: &[&str] = &["not", "no", "never", "dont", "don't", "isnt", "isn't", "cant", "can't", "without"];

const INTENSIFIERS: &[&str] = &["very", "really", "so", "extremely", "super", "totally", "incredibly"];

const INTENSIFIER_BOOST: f32 = 1.5;

/// Normalizes the raw sum into -1..1.
const NORMALIZATION_ALPHA: f32 = 15.0;

/// How many following words a negation reaches.
const NEGATION_WINDOW: usize = 3;

pub struct LexiconAnalyzer {
    lexicon: HashMap<&'static str, f32>,
}

impl Default for LexiconAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconAnalyzer {
    pub fn new() -> Self {
        Self {
            lexicon: LEXICON.iter().copied().collect(),
        }
    }

    pub fn score(&self, text: &str) -> Result<SentimentResult> {
        let words: Vec<String> = text
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        if words.is_empty() {
            return Err(AppError::Validation("Text must not be empty".to_string()));
        }

        let mut total = 0.0;
        let mut matched = 0usize;
        let mut negated_for = 0usize;
        let mut boost = 1.0;

        for word in &words {
            let word = word.as_str();
            if NEGATIONS.contains(&word) {
                negated_for = NEGATION_WINDOW;
                continue;
            }
            if INTENSIFIERS.contains(&word) {
                boost = INTENSIFIER_BOOST;
                continue;
            }

            if let Some(&weight) = self.lexicon.get(word) {
                let mut value = weight * boost;
                if negated_for > 0 {
                    // "not happy" is weaker than "sad"
                    value = -value * 0.75;
                    negated_for = 0;
                }
                total += value;
                matched += 1;
            }

            boost = 1.0;
            negated_for = negated_for.saturating_sub(1);
        }

        let score = (total / (total * total + NORMALIZATION_ALPHA).sqrt()).clamp(-1.0, 1.0);
        let confidence = if matched == 0 {
            0.3
        } else {
            let coverage = matched as f32 / words.len() as f32;
            0.5 + 0.45 * (coverage * 4.0).min(1.0)
        };
        let label = MoodCategory::from_score(score).label().to_string();

        debug!(
            "Scored {} words ({} matched): score {:.3}, {}",
            words.len(),
            matched,
            score,
            label
        );

        Ok(SentimentResult {
            score,
            label,
            confidence,
        })
    }
}

#[async_trait]
impl SentimentAnalyzer for LexiconAnalyzer {
    async fn analyze(&self, text: &str) -> Result<SentimentResult> {
        self.score(text)
    }
}
