use crate::error::{AppError, Result};
use crate::models::{LogMoodRequest, MoodLogEntry};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Append-only record of analyzed moods.
pub struct MoodJournal {
    db: PgPool,
}

impl MoodJournal {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn log(&self, user_id: &str, req: &LogMoodRequest) -> Result<MoodLogEntry> {
        req.validate()
            .map_err(|e| AppError::Validation(format!("Invalid mood log: {}", e)))?;

        let mut tx = self.db.begin().await?;

        sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let entry = sqlx::query_as::<_, MoodLogEntry>(
            r#"
            INSERT INTO mood_logs (id, user_id, text, sentiment_score, sentiment_label)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(req.text.trim())
        .bind(req.sentiment_score)
        .bind(&req.sentiment_label)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            "Logged mood {} ({}) for user {}",
            entry.id,
            entry.sentiment_label,
            user_id
        );
        Ok(entry)
    }
}
