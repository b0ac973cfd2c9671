use super::{AccessToken, SavedTracksPage, SpotifyApi};
use crate::error::{AppError, Result};
use crate::models::{AudioFeatures, CreatedPlaylist, Credential, Device, SpotifyProfile, Track};
use crate::services::token_manager::TokenManager;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on an advertised `Retry-After` we are willing to sleep through.
const MAX_RATE_LIMIT_WAIT_SECS: u64 = 10;

/// Opens request-scoped sessions for a user.
pub struct SpotifyService {
    api: Arc<dyn SpotifyApi>,
    tokens: Arc<TokenManager>,
    call_timeout: Duration,
}

impl SpotifyService {
    pub fn new(api: Arc<dyn SpotifyApi>, tokens: Arc<TokenManager>, call_timeout: Duration) -> Self {
        Self {
            api,
            tokens,
            call_timeout,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Finishes the OAuth flow for `user_id`: code exchange plus profile lookup.
    pub async fn connect(&self, user_id: &str, code: &str) -> Result<Credential> {
        let connect = self.tokens.connect(user_id, code, self.api.as_ref());
        tokio::time::timeout(self.call_timeout * 2, connect)
            .await
            .map_err(|_| AppError::UpstreamTimeout("account connection timed out".to_string()))?
    }

    pub async fn open_session(&self, user_id: &str) -> Result<SpotifySession> {
        let token = self.tokens.get_valid_access_token(user_id).await?;

        Ok(SpotifySession {
            api: self.api.clone(),
            tokens: self.tokens.clone(),
            user_id: user_id.to_string(),
            token,
            call_timeout: self.call_timeout,
        })
    }
}

/// A user's access token plus the retry policy, scoped to one inbound request.
///
/// Every call is bounded by the per-call timeout. A 401 triggers one forced
/// refresh and a single retry; a second 401 becomes `RefreshFailed`. A 429
/// is retried once after the advertised wait. Timeouts are never retried,
/// since the upstream may have acted on the request.
pub struct SpotifySession {
    api: Arc<dyn SpotifyApi>,
    tokens: Arc<TokenManager>,
    user_id: String,
    token: AccessToken,
    call_timeout: Duration,
}

#[derive(Debug, Default)]
struct RetryState {
    refreshed: bool,
    rate_limited: bool,
}

impl SpotifySession {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub async fn current_user(&mut self) -> Result<SpotifyProfile> {
        self.call("profile", |api, token| async move { api.current_user(&token).await })
            .await
    }

    pub async fn saved_tracks(&mut self, limit: u32, offset: u32) -> Result<SavedTracksPage> {
        self.call("saved tracks", move |api, token| async move {
            api.saved_tracks(&token, limit, offset).await
        })
        .await
    }

    pub async fn top_tracks(&mut self, limit: u32, time_range: &str) -> Result<Vec<Track>> {
        self.call("top tracks", |api, token| {
            let time_range = time_range.to_string();
            async move { api.top_tracks(&token, limit, &time_range).await }
        })
        .await
    }

    pub async fn search_tracks(&mut self, query: &str, limit: u32) -> Result<Vec<Track>> {
        self.call("track search", |api, token| {
            let query = query.to_string();
            async move { api.search_tracks(&token, &query, limit).await }
        })
        .await
    }

    pub async fn audio_features(&mut self, track_ids: &[String]) -> Result<HashMap<String, AudioFeatures>> {
        self.call("audio features", |api, token| {
            let track_ids = track_ids.to_vec();
            async move { api.audio_features(&token, &track_ids).await }
        })
        .await
    }

    pub async fn create_playlist(
        &mut self,
        owner_id: &str,
        name: &str,
        description: &str,
    ) -> Result<CreatedPlaylist> {
        self.call("playlist creation", |api, token| {
            let (owner_id, name, description) =
                (owner_id.to_string(), name.to_string(), description.to_string());
            async move {
                api.create_playlist(&token, &owner_id, &name, &description)
                    .await
            }
        })
        .await
    }

    pub async fn add_tracks(&mut self, playlist_id: &str, uris: &[String]) -> Result<()> {
        self.call("add tracks", |api, token| {
            let playlist_id = playlist_id.to_string();
            let uris = uris.to_vec();
            async move { api.add_tracks(&token, &playlist_id, &uris).await }
        })
        .await
    }

    pub async fn devices(&mut self) -> Result<Vec<Device>> {
        self.call("devices", |api, token| async move { api.devices(&token).await })
            .await
    }

    pub async fn play(&mut self, uri: &str, device_id: Option<&str>) -> Result<()> {
        self.call("playback", |api, token| {
            let uri = uri.to_string();
            let device_id = device_id.map(str::to_string);
            async move { api.play(&token, &uri, device_id.as_deref()).await }
        })
        .await
    }

    async fn call<T, F, Fut>(&mut self, what: &str, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn SpotifyApi>, AccessToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = RetryState::default();

        loop {
            let attempt = op(self.api.clone(), self.token.clone());
            let result = match tokio::time::timeout(self.call_timeout, attempt).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        "Spotify {} for user {} exceeded {:?}",
                        what,
                        self.user_id,
                        self.call_timeout
                    );
                    Err(AppError::UpstreamTimeout(format!("{} timed out", what)))
                }
            };

            match result {
                Err(e) => self.recover(what, e, &mut retry).await?,
                ok => return ok,
            }
        }
    }

    /// `Ok(())` means the failed call should be attempted again.
    async fn recover(&mut self, what: &str, err: AppError, retry: &mut RetryState) -> Result<()> {
        match err {
            AppError::UpstreamAuth if !retry.refreshed => {
                retry.refreshed = true;
                tracing::info!(
                    "Spotify rejected access token during {} for user {}, forcing refresh",
                    what,
                    self.user_id
                );
                self.token = self.tokens.force_refresh(&self.user_id, &self.token).await?;
                Ok(())
            }
            AppError::UpstreamAuth => {
                tracing::warn!("Spotify rejected refreshed token for user {}", self.user_id);
                Err(AppError::RefreshFailed)
            }
            AppError::UpstreamRateLimited { retry_after } if !retry.rate_limited => {
                retry.rate_limited = true;
                let wait = retry_after.unwrap_or(1);
                if wait > MAX_RATE_LIMIT_WAIT_SECS {
                    return Err(AppError::UpstreamRateLimited { retry_after });
                }
                tracing::warn!("Spotify rate limited {}, retrying in {}s", what, wait);
                tokio::time::sleep(Duration::from_secs(wait)).await;
                Ok(())
            }
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{
        credential_expiring_in, FakeSpotifyApi, FakeTokenEndpoint, MemoryCredentialStore,
    };
    use chrono::Duration as ChronoDuration;

    fn service(api: Arc<FakeSpotifyApi>, endpoint: Arc<FakeTokenEndpoint>) -> SpotifyService {
        let store = Arc::new(MemoryCredentialStore::default());
        store.insert(credential_expiring_in("user_1", ChronoDuration::hours(1)));
        let tokens = Arc::new(TokenManager::new(store, endpoint, Duration::from_secs(60)));
        SpotifyService::new(api, tokens, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn unauthorized_call_refreshes_once_and_retries() {
        let api = Arc::new(FakeSpotifyApi::default());
        api.reject_tokens_except("refreshed-1");
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let service = service(api.clone(), endpoint.clone());

        let mut session = service.open_session("user_1").await.unwrap();
        let profile = session.current_user().await.unwrap();

        assert_eq!(profile.id, "spotify_user_1");
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(api.profile_calls(), 2);
    }

    #[tokio::test]
    async fn repeated_unauthorized_escalates_to_refresh_failed() {
        let api = Arc::new(FakeSpotifyApi::default());
        api.reject_tokens_except("never-issued");
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let service = service(api.clone(), endpoint.clone());

        let mut session = service.open_session("user_1").await.unwrap();
        let err = session.current_user().await.unwrap_err();

        assert!(matches!(err, AppError::RefreshFailed));
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(api.profile_calls(), 2);
    }

    #[tokio::test]
    async fn rate_limit_is_retried_once() {
        let api = Arc::new(FakeSpotifyApi::default());
        api.rate_limit_next_calls(1, Some(0));
        let service = service(api.clone(), Arc::new(FakeTokenEndpoint::default()));

        let mut session = service.open_session("user_1").await.unwrap();
        assert!(session.current_user().await.is_ok());
        assert_eq!(api.profile_calls(), 2);
    }

    #[tokio::test]
    async fn persistent_rate_limit_is_surfaced() {
        let api = Arc::new(FakeSpotifyApi::default());
        api.rate_limit_next_calls(5, Some(0));
        let service = service(api.clone(), Arc::new(FakeTokenEndpoint::default()));

        let mut session = service.open_session("user_1").await.unwrap();
        let err = session.current_user().await.unwrap_err();

        assert!(matches!(err, AppError::UpstreamRateLimited { .. }));
        assert_eq!(api.profile_calls(), 2);
    }

    #[tokio::test]
    async fn playback_goes_through_token_refresh() {
        let api = Arc::new(FakeSpotifyApi::default());
        api.add_device("desk", true);
        api.reject_tokens_except("refreshed-1");
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let service = service(api.clone(), endpoint.clone());

        let mut session = service.open_session("user_1").await.unwrap();
        session.play("spotify:track:t1", None).await.unwrap();

        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(api.played(), vec![("spotify:track:t1".to_string(), None)]);
        assert_eq!(session.devices().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hanging_upstream_times_out_without_retry() {
        let api = Arc::new(FakeSpotifyApi::default());
        api.hang_profile_calls();
        let store = Arc::new(MemoryCredentialStore::default());
        store.insert(credential_expiring_in("user_1", ChronoDuration::hours(1)));
        let tokens = Arc::new(TokenManager::new(
            store,
            Arc::new(FakeTokenEndpoint::default()),
            Duration::from_secs(60),
        ));
        let service = SpotifyService::new(api.clone(), tokens, Duration::from_millis(50));

        let mut session = service.open_session("user_1").await.unwrap();
        let err = session.current_user().await.unwrap_err();

        assert!(matches!(err, AppError::UpstreamTimeout(_)));
        assert_eq!(api.profile_calls(), 1);
    }
}
