use crate::config::Config;
use crate::error::{AppError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

/// How long a user has to finish the Spotify consent screen.
const OAUTH_STATE_TTL_MINUTES: i64 = 10;

/// Claims of the identity provider's bearer token. `sub` is the local user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

/// Payload of the OAuth `state` parameter.
#[derive(Debug, Serialize, Deserialize)]
struct OAuthState {
    sub: String,
    nonce: String,
    exp: i64,
}

pub struct AuthService {
    jwt_secret: String,
    /// Separate key so a `state` value can never pass as a bearer token.
    state_secret: String,
}

impl AuthService {
    pub fn new(config: &Config) -> Self {
        Self::with_secret(&config.auth_jwt_secret)
    }

    pub fn with_secret(secret: &str) -> Self {
        Self {
            jwt_secret: secret.to_string(),
            state_secret: format!("{}:oauth-state", secret),
        }
    }

    pub async fn verify_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized)?;

        if token_data.claims.sub.trim().is_empty() {
            return Err(AppError::Unauthorized);
        }

        Ok(token_data.claims)
    }

    /// Signed, short-lived `state` binding the callback to `user_id`.
    pub fn issue_oauth_state(&self, user_id: &str) -> Result<String> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();

        let state = OAuthState {
            sub: user_id.to_string(),
            nonce,
            exp: (Utc::now() + Duration::minutes(OAUTH_STATE_TTL_MINUTES)).timestamp(),
        };

        encode(
            &Header::default(),
            &state,
            &EncodingKey::from_secret(self.state_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("State signing failed: {}", e)))
    }

    /// Returns the user id the state was issued for.
    pub fn verify_oauth_state(&self, state: &str) -> Result<String> {
        decode::<OAuthState>(
            state,
            &DecodingKey::from_secret(self.state_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims.sub)
        .map_err(|e| {
            tracing::warn!("Rejected OAuth state: {}", e);
            AppError::Validation("Invalid or expired authorization state".to_string())
        })
    }

    #[cfg(test)]
    pub fn issue_token(&self, user_id: &str) -> String {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .unwrap()
    }
}
