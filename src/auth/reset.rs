use axum::async_trait;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::{Duration as TimeDuration, OffsetDateTime};
use uuid::Uuid;

/// Ledger entry for a single-use password-reset token.
///
/// Lifecycle: created → consumed exactly once, or left to expire. A used
/// token stays dead forever, expired or not.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token: String,
    pub expires_at: OffsetDateTime,
    pub used: bool,
    pub created_at: OffsetDateTime,
}

pub const RESET_TOKEN_TTL: TimeDuration = TimeDuration::hours(1);

/// 128 bits from the OS CSPRNG, hex encoded.
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Narrow data-access capability for the reset-token ledger.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    async fn create(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<ResetToken>;

    /// Consumes a live token and swaps the owner's credential in the same
    /// transaction, so the two writes land together or not at all. Returns
    /// the owner id, or `None` when no live entry matches; absent, already
    /// used and expired are indistinguishable to callers.
    async fn consume(
        &self,
        token: &str,
        now: OffsetDateTime,
        new_password_hash: &str,
    ) -> anyhow::Result<Option<Uuid>>;
}

#[derive(Clone)]
pub struct PgResetTokenStore {
    pool: PgPool,
}

impl PgResetTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResetTokenStore for PgResetTokenStore {
    async fn create(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<ResetToken> {
        let entry = sqlx::query_as::<_, ResetToken>(
            r#"
            INSERT INTO password_reset_tokens (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token, expires_at, used, created_at
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn consume(
        &self,
        token: &str,
        now: OffsetDateTime,
        new_password_hash: &str,
    ) -> anyhow::Result<Option<Uuid>> {
        let mut tx = self.pool.begin().await?;

        // The predicate is the once-only guard: a concurrent consumer of the
        // same token matches zero rows here and sees the generic failure.
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE password_reset_tokens
            SET used = TRUE
            WHERE token = $1 AND used = FALSE AND expires_at > $2
            RETURNING user_id
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id,)) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(r#"UPDATE users SET password_hash = $1 WHERE id = $2"#)
            .bind(new_password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_hex_and_unique() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
