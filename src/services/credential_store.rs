use crate::error::AppError;
use crate::models::Credential;
use async_trait::async_trait;
use sqlx::PgPool;

/// Keeps "never connected" apart from "backend unavailable".
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("credential not found")]
    NotFound,

    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotConnected,
            StoreError::Unavailable(msg) => AppError::StoreUnavailable(msg),
        }
    }
}

/// One Spotify credential per local user.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or replace the user's credential.
    async fn upsert(&self, credential: &Credential) -> Result<(), StoreError>;

    async fn get(&self, user_id: &str) -> Result<Credential, StoreError>;

    /// Deleting a missing credential is not an error.
    async fn delete(&self, user_id: &str) -> Result<(), StoreError>;
}

pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn upsert(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;

        // The callback arrives without a session, so the user row may not exist yet
        sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(&credential.user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO spotify_tokens (
                user_id, access_token, refresh_token, expires_at,
                spotify_user_id, spotify_display_name, spotify_email, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                spotify_user_id = EXCLUDED.spotify_user_id,
                spotify_display_name = EXCLUDED.spotify_display_name,
                spotify_email = EXCLUDED.spotify_email,
                updated_at = NOW()
            "#,
        )
        .bind(&credential.user_id)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(&credential.spotify_user_id)
        .bind(&credential.spotify_display_name)
        .bind(&credential.spotify_email)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Credential, StoreError> {
        sqlx::query_as::<_, Credential>("SELECT * FROM spotify_tokens WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM spotify_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        tracing::info!(
            "Removed {} Spotify credential(s) for user {}",
            result.rows_affected(),
            user_id
        );
        Ok(())
    }
}
