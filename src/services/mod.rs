pub mod auth;
pub mod credential_store;
pub mod journal;
pub mod library_pager;
pub mod mood_mapper;
pub mod playlist;
pub mod recommender;
pub mod sentiment;
pub mod spotify;
pub mod token_manager;
pub mod users;

#[cfg(test)]
pub mod testing;

pub use auth::AuthService;
pub use credential_store::PgCredentialStore;
pub use journal::MoodJournal;
pub use library_pager::LibraryPager;
pub use mood_mapper::MoodMapper;
pub use playlist::PlaylistOrchestrator;
pub use recommender::Recommender;
pub use sentiment::{LexiconAnalyzer, SentimentAnalyzer};
pub use spotify::{SpotifyClient, SpotifyService};
pub use token_manager::TokenManager;
pub use users::UserService;
