use crate::error::{AppError, Result};
use crate::models::Credential;
use crate::services::credential_store::{CredentialStore, StoreError};
use crate::services::spotify::{AccessToken, SpotifyApi, TokenEndpoint};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

type RefreshLocks = Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// Hands out access tokens that are valid right now.
///
/// Refreshes are single-flight per user: concurrent callers that find an
/// expired credential queue on the user's lock, and everyone after the first
/// picks up the credential the first caller persisted.
pub struct TokenManager {
    store: Arc<dyn CredentialStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    refresh_margin: chrono::Duration,
    refresh_locks: Arc<RefreshLocks>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            store,
            endpoint,
            refresh_margin: chrono::Duration::from_std(refresh_margin)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            refresh_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get_valid_access_token(&self, user_id: &str) -> Result<AccessToken> {
        let credential = self.store.get(user_id).await?;
        if credential.is_fresh(Utc::now(), self.refresh_margin) {
            return Ok(AccessToken::new(credential.access_token));
        }

        tracing::debug!("Access token for user {} expires at {}, refreshing", user_id, credential.expires_at);
        self.refresh_detached(user_id, None).await
    }

    /// Refresh after the upstream rejected `rejected` despite its expiry looking fine.
    pub async fn force_refresh(&self, user_id: &str, rejected: &AccessToken) -> Result<AccessToken> {
        self.refresh_detached(user_id, Some(rejected.clone())).await
    }

    pub fn authorize_url(&self, state: &str) -> Result<String> {
        self.endpoint.authorize_url(state)
    }

    /// Completes the connect flow: exchange the code, look up the account, persist.
    pub async fn connect(&self, user_id: &str, code: &str, api: &dyn SpotifyApi) -> Result<Credential> {
        let grant = self.endpoint.exchange_code(code).await?;
        let refresh_token = grant.refresh_token.ok_or_else(|| {
            AppError::UpstreamMalformed("code exchange returned no refresh token".to_string())
        })?;
        let token = AccessToken::new(grant.access_token.clone());
        let profile = api.current_user(&token).await?;
        let now = Utc::now();

        let credential = Credential {
            user_id: user_id.to_string(),
            access_token: grant.access_token,
            refresh_token,
            expires_at: expiry_after(now, grant.expires_in)?,
            spotify_user_id: profile.id,
            spotify_display_name: profile.display_name,
            spotify_email: profile.email,
            updated_at: now,
        };

        self.store.upsert(&credential).await?;
        tracing::info!(
            "Connected Spotify account {} for user {}",
            credential.spotify_user_id,
            user_id
        );
        Ok(credential)
    }

    /// `None` when the user never connected.
    pub async fn credential(&self, user_id: &str) -> Result<Option<Credential>> {
        match self.store.get(user_id).await {
            Ok(credential) => Ok(Some(credential)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn disconnect(&self, user_id: &str) -> Result<()> {
        self.store.delete(user_id).await?;
        Ok(())
    }

    /// The refresh runs on its own task: once the upstream has been asked to
    /// rotate, the outcome is persisted even if the caller stops waiting.
    async fn refresh_detached(&self, user_id: &str, rejected: Option<AccessToken>) -> Result<AccessToken> {
        let refresh = Refresh {
            store: self.store.clone(),
            endpoint: self.endpoint.clone(),
            margin: self.refresh_margin,
            locks: self.refresh_locks.clone(),
            user_id: user_id.to_string(),
            rejected,
        };

        tokio::spawn(refresh.run()).await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("token refresh task for user {} failed: {}", user_id, e))
        })?
    }
}

/// One serialized refresh for one user, owned by its task.
struct Refresh {
    store: Arc<dyn CredentialStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    margin: chrono::Duration,
    locks: Arc<RefreshLocks>,
    user_id: String,
    rejected: Option<AccessToken>,
}

impl Refresh {
    async fn run(self) -> Result<AccessToken> {
        let lock = self.lock_for().await;
        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked().await
        };

        drop(lock);
        self.release_lock().await;
        result
    }

    async fn refresh_locked(&self) -> Result<AccessToken> {
        let user_id = self.user_id.as_str();

        // Someone may have refreshed while we waited for the lock
        let credential = self.store.get(user_id).await?;
        let still_valid = match &self.rejected {
            Some(rejected) => rejected.secret() != credential.access_token,
            None => credential.is_fresh(Utc::now(), self.margin),
        };
        if still_valid {
            tracing::debug!("Using token refreshed by a concurrent request for user {}", user_id);
            return Ok(AccessToken::new(credential.access_token));
        }

        let grant = match self.endpoint.refresh(&credential.refresh_token).await {
            Ok(grant) => grant,
            Err(AppError::RefreshFailed) => {
                tracing::warn!("Refresh token rejected for user {}, reconnect required", user_id);
                return Err(AppError::RefreshFailed);
            }
            Err(e) => {
                tracing::error!("Token refresh failed for user {}: {}", user_id, e);
                return Err(e);
            }
        };

        let now = Utc::now();
        let expires_at = expiry_after(now, grant.expires_in)?;
        let updated = Credential {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.unwrap_or(credential.refresh_token),
            expires_at,
            updated_at: now,
            ..credential
        };

        self.store.upsert(&updated).await?;
        tracing::info!("Refreshed Spotify token for user {}, valid until {}", user_id, updated.expires_at);

        Ok(AccessToken::new(updated.access_token))
    }

    async fn lock_for(&self) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(self.user_id.clone())
            .or_default()
            .clone()
    }

    /// Drops the user's lock entry once nobody else holds or awaits it.
    async fn release_lock(&self) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.user_id);
        }
    }
}

/// `now + seconds`, rejecting lifetimes that are zero or out of range.
fn expiry_after(now: DateTime<Utc>, seconds: u64) -> Result<DateTime<Utc>> {
    let unusable = || {
        AppError::UpstreamMalformed(format!("token response has an unusable expires_in of {}", seconds))
    };
    if seconds == 0 {
        return Err(unusable());
    }

    let lifetime = i64::try_from(seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(unusable)?;
    now.checked_add_signed(lifetime).ok_or_else(unusable)
}
