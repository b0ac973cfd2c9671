use crate::error::{AppError, Result};
use crate::models::SetUsernameRequest;
use sqlx::PgPool;
use validator::Validate;

/// Local user rows. Accounts themselves live with the identity provider.
pub struct UserService {
    db: PgPool,
}

impl UserService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Claims `username` for `user_id`. Setting the name a user already holds is a no-op.
    pub async fn set_username(&self, user_id: &str, req: &SetUsernameRequest) -> Result<String> {
        validate_username(req)?;
        let username = req.username.trim();

        let holder: Option<String> =
            sqlx::query_scalar("SELECT id FROM users WHERE lower(username) = lower($1)")
                .bind(username)
                .fetch_optional(&self.db)
                .await?;

        match holder {
            Some(id) if id == user_id => return Ok(username.to_string()),
            Some(_) => return Err(username_taken()),
            None => {}
        }

        sqlx::query(
            r#"
            INSERT INTO users (id, username)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(username)
        .execute(&self.db)
        .await
        .map_err(|e| {
            // Lost a race with another user claiming the same name
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return username_taken();
                }
            }
            AppError::Database(e)
        })?;

        tracing::info!("User {} set username to {}", user_id, username);
        Ok(username.to_string())
    }
}

fn username_taken() -> AppError {
    AppError::Conflict("Username is already taken".to_string())
}

fn validate_username(req: &SetUsernameRequest) -> Result<()> {
    req.validate()
        .map_err(|_| AppError::Validation("Username must be 3 to 30 characters".to_string()))?;

    if !req.has_valid_chars() {
        return Err(AppError::Validation(
            "Username may only contain letters, digits, '_', '.' and '-'".to_string(),
        ));
    }
    Ok(())
}
