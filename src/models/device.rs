use serde::{Deserialize, Serialize};

/// A Spotify Connect playback target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    /// Absent for restricted devices, which cannot be targeted.
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub is_active: bool,
    pub volume_percent: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub uri: String,
    pub device_id: Option<String>,
}
