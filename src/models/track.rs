use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration_ms: u64,
    pub popularity: u32,
    pub uri: String,
}

/// Per-track audio analysis. Both values are in 0.0..=1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AudioFeatures {
    pub valence: f32,
    pub energy: f32,
}
