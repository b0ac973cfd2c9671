pub mod credential;
pub mod device;
pub mod mood;
pub mod playlist;
pub mod track;
pub mod user;

pub use credential::{Credential, SpotifyProfile};
pub use device::{Device, PlayRequest};
pub use mood::{
    AnalyzeMoodRequest, LogMoodRequest, MoodCategory, MoodLogEntry, PlaylistShape,
    RecommendationRequest, SentimentResult, TrackSource,
};
pub use playlist::{CreatePlaylistRequest, CreatedPlaylist, PlaylistCreationResult};
pub use track::{AudioFeatures, Track};
pub use user::SetUsernameRequest;
