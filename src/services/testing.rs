//! In-memory stand-ins for the upstream and the database, with call counters.

use crate::error::{AppError, Result};
use crate::models::{AudioFeatures, CreatedPlaylist, Credential, Device, SpotifyProfile, Track};
use crate::services::credential_store::{CredentialStore, StoreError};
use crate::services::spotify::{AccessToken, SavedTracksPage, SpotifyApi, TokenEndpoint, TokenGrant};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn credential_expiring_in(user_id: &str, ttl: ChronoDuration) -> Credential {
    Credential {
        user_id: user_id.to_string(),
        access_token: "initial-token".to_string(),
        refresh_token: "initial-refresh".to_string(),
        expires_at: Utc::now() + ttl,
        spotify_user_id: "spotify_user_1".to_string(),
        spotify_display_name: Some("Test Listener".to_string()),
        spotify_email: None,
        updated_at: Utc::now(),
    }
}

pub fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        name: format!("Track {}", id),
        artists: vec!["Artist".to_string()],
        album: "Album".to_string(),
        duration_ms: 180_000,
        popularity: 50,
        uri: format!("spotify:track:{}", id),
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<HashMap<String, Credential>>,
    unavailable: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn insert(&self, credential: Credential) {
        self.credentials
            .lock()
            .unwrap()
            .insert(credential.user_id.clone(), credential);
    }

    pub fn len(&self) -> usize {
        self.credentials.lock().unwrap().len()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> std::result::Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn upsert(&self, credential: &Credential) -> std::result::Result<(), StoreError> {
        self.check()?;
        self.insert(credential.clone());
        Ok(())
    }

    async fn get(&self, user_id: &str) -> std::result::Result<Credential, StoreError> {
        self.check()?;
        self.credentials
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, user_id: &str) -> std::result::Result<(), StoreError> {
        self.check()?;
        self.credentials.lock().unwrap().remove(user_id);
        Ok(())
    }
}

/// Issues `refreshed-N` access tokens, counting refresh calls.
#[derive(Default)]
pub struct FakeTokenEndpoint {
    refreshes: AtomicUsize,
    delay: Option<Duration>,
    reject: AtomicBool,
    rotate: AtomicBool,
    lifetime: Mutex<Option<u64>>,
}

impl FakeTokenEndpoint {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn reject_refresh(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }

    pub fn rotate_refresh_tokens(&self) {
        self.rotate.store(true, Ordering::SeqCst);
    }

    /// Overrides the `expires_in` of refreshed grants.
    pub fn grant_lifetime(&self, seconds: u64) {
        *self.lifetime.lock().unwrap() = Some(seconds);
    }
}

#[async_trait]
impl TokenEndpoint for FakeTokenEndpoint {
    fn authorize_url(&self, state: &str) -> Result<String> {
        Ok(format!("https://accounts.example/authorize?state={}", state))
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenGrant> {
        Ok(TokenGrant {
            access_token: "exchanged-token".to_string(),
            refresh_token: Some("exchanged-refresh".to_string()),
            expires_in: 3600,
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(AppError::RefreshFailed);
        }

        Ok(TokenGrant {
            access_token: format!("refreshed-{}", n),
            refresh_token: self
                .rotate
                .load(Ordering::SeqCst)
                .then(|| format!("rotated-refresh-{}", n)),
            expires_in: self.lifetime.lock().unwrap().unwrap_or(3600),
        })
    }
}

/// Scriptable upstream. Saved-track pages are served in order; any call past
/// the script returns an empty final page.
#[derive(Default)]
pub struct FakeSpotifyApi {
    profile_calls: AtomicUsize,
    page_calls: AtomicUsize,
    create_calls: AtomicUsize,
    add_calls: AtomicUsize,
    search_calls: AtomicUsize,
    allowed_token: Mutex<Option<String>>,
    rate_limits: Mutex<(usize, Option<u64>)>,
    hang_profile: AtomicBool,
    page_delay: Mutex<Option<Duration>>,
    pages: Mutex<VecDeque<Result<SavedTracksPage>>>,
    search_results: Mutex<HashMap<String, Vec<Track>>>,
    features: Mutex<HashMap<String, AudioFeatures>>,
    create_error: Mutex<Option<AppError>>,
    add_failures_after: Mutex<Option<usize>>,
    added: Mutex<Vec<String>>,
    devices: Mutex<Vec<Device>>,
    played: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeSpotifyApi {
    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn added_uris(&self) -> Vec<String> {
        self.added.lock().unwrap().clone()
    }

    pub fn add_device(&self, id: &str, is_active: bool) {
        self.devices.lock().unwrap().push(Device {
            id: Some(id.to_string()),
            name: format!("Device {}", id),
            device_type: "Computer".to_string(),
            is_active,
            volume_percent: Some(50),
        });
    }

    /// `(uri, device_id)` of every accepted play call.
    pub fn played(&self) -> Vec<(String, Option<String>)> {
        self.played.lock().unwrap().clone()
    }

    /// Every other token gets a 401.
    pub fn reject_tokens_except(&self, token: &str) {
        *self.allowed_token.lock().unwrap() = Some(token.to_string());
    }

    pub fn rate_limit_next_calls(&self, count: usize, retry_after: Option<u64>) {
        *self.rate_limits.lock().unwrap() = (count, retry_after);
    }

    pub fn hang_profile_calls(&self) {
        self.hang_profile.store(true, Ordering::SeqCst);
    }

    pub fn delay_pages(&self, delay: Duration) {
        *self.page_delay.lock().unwrap() = Some(delay);
    }

    /// Queue pages of the given sizes; all but the last report more to come.
    pub fn push_library_pages(&self, sizes: &[usize]) {
        let mut pages = self.pages.lock().unwrap();
        let mut next_id = pages.len() * 1000;
        for (i, size) in sizes.iter().enumerate() {
            let items: Vec<Track> = (0..*size)
                .map(|_| {
                    next_id += 1;
                    track(&format!("lib{}", next_id))
                })
                .collect();
            pages.push_back(Ok(SavedTracksPage {
                page_len: items.len(),
                items: Some(items),
                has_more: i + 1 < sizes.len(),
            }));
        }
    }

    pub fn push_page(&self, page: Result<SavedTracksPage>) {
        self.pages.lock().unwrap().push_back(page);
    }

    pub fn set_search_results(&self, query: &str, tracks: Vec<Track>) {
        self.search_results
            .lock()
            .unwrap()
            .insert(query.to_string(), tracks);
    }

    pub fn set_features(&self, track_id: &str, valence: f32, energy: f32) {
        self.features
            .lock()
            .unwrap()
            .insert(track_id.to_string(), AudioFeatures { valence, energy });
    }

    pub fn fail_creation_with(&self, error: AppError) {
        *self.create_error.lock().unwrap() = Some(error);
    }

    /// Add-tracks calls succeed this many times, then fail.
    pub fn fail_adds_after(&self, successes: usize) {
        *self.add_failures_after.lock().unwrap() = Some(successes);
    }

    fn gate(&self, token: &AccessToken) -> Result<()> {
        {
            let mut limits = self.rate_limits.lock().unwrap();
            if limits.0 > 0 {
                limits.0 -= 1;
                return Err(AppError::UpstreamRateLimited {
                    retry_after: limits.1,
                });
            }
        }
        match self.allowed_token.lock().unwrap().as_deref() {
            Some(allowed) if allowed != token.secret() => Err(AppError::UpstreamAuth),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SpotifyApi for FakeSpotifyApi {
    async fn current_user(&self, token: &AccessToken) -> Result<SpotifyProfile> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_profile.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        self.gate(token)?;

        Ok(SpotifyProfile {
            id: "spotify_user_1".to_string(),
            display_name: Some("Test Listener".to_string()),
            email: Some("listener@example.com".to_string()),
            followers: 3,
            images: vec![],
        })
    }

    async fn saved_tracks(&self, token: &AccessToken, _limit: u32, _offset: u32) -> Result<SavedTracksPage> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.page_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.gate(token)?;

        self.pages.lock().unwrap().pop_front().unwrap_or(Ok(SavedTracksPage {
            items: Some(vec![]),
            page_len: 0,
            has_more: false,
        }))
    }

    async fn top_tracks(&self, token: &AccessToken, limit: u32, _time_range: &str) -> Result<Vec<Track>> {
        self.gate(token)?;
        Ok((0..limit).map(|i| track(&format!("top{}", i))).collect())
    }

    async fn search_tracks(&self, token: &AccessToken, query: &str, limit: u32) -> Result<Vec<Track>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(token)?;

        let results = self.search_results.lock().unwrap();
        Ok(results
            .get(query)
            .map(|tracks| tracks.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn audio_features(
        &self,
        token: &AccessToken,
        track_ids: &[String],
    ) -> Result<HashMap<String, AudioFeatures>> {
        self.gate(token)?;

        let features = self.features.lock().unwrap();
        Ok(track_ids
            .iter()
            .filter_map(|id| features.get(id).map(|f| (id.clone(), *f)))
            .collect())
    }

    async fn create_playlist(
        &self,
        token: &AccessToken,
        _owner_id: &str,
        _name: &str,
        _description: &str,
    ) -> Result<CreatedPlaylist> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.gate(token)?;

        if let Some(error) = self.create_error.lock().unwrap().take() {
            return Err(error);
        }

        Ok(CreatedPlaylist {
            id: format!("playlist{}", n),
            url: format!("https://open.spotify.com/playlist/playlist{}", n),
        })
    }

    async fn add_tracks(&self, token: &AccessToken, _playlist_id: &str, uris: &[String]) -> Result<()> {
        let n = self.add_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(token)?;

        if let Some(successes) = *self.add_failures_after.lock().unwrap() {
            if n >= successes {
                return Err(AppError::ExternalApi("Spotify add tracks failed with status 500".into()));
            }
        }

        self.added.lock().unwrap().extend(uris.iter().cloned());
        Ok(())
    }

    async fn devices(&self, token: &AccessToken) -> Result<Vec<Device>> {
        self.gate(token)?;
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn play(&self, token: &AccessToken, uri: &str, device_id: Option<&str>) -> Result<()> {
        self.gate(token)?;

        let devices = self.devices.lock().unwrap();
        let target = match device_id {
            Some(id) => devices.iter().any(|d| d.id.as_deref() == Some(id)),
            None => devices.iter().any(|d| d.is_active),
        };
        if !target {
            return Err(AppError::NotFound("No active Spotify device".to_string()));
        }

        self.played
            .lock()
            .unwrap()
            .push((uri.to_string(), device_id.map(str::to_string)));
        Ok(())
    }
}
