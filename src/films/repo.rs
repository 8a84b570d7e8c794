use axum::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Film record. `average_rating` and `total_ratings` are derived entirely
/// from the rating set and rewritten after every rating mutation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Film {
    pub id: Uuid,
    pub title: String,
    pub release_year: Option<i32>,
    pub average_rating: f64,
    pub total_ratings: i64,
    pub created_at: OffsetDateTime,
}

/// One user's rating of one film. At most one per (user, film) pair.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Rating {
    pub id: Uuid,
    pub user_id: Uuid,
    pub film_id: Uuid,
    pub value: f64,
    pub created_at: OffsetDateTime,
}

/// What the aggregator and the browse surface need from films: lookups and
/// the derived-field write-back. Catalog ingest lives elsewhere.
#[async_trait]
pub trait FilmStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Film>>;
    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<Film>>;
    async fn write_aggregate(
        &self,
        film_id: Uuid,
        average_rating: f64,
        total_ratings: i64,
    ) -> anyhow::Result<()>;
}

/// Narrow data-access capability for rating records.
#[async_trait]
pub trait RatingStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Rating>>;
    async fn find_by_user_and_film(
        &self,
        user_id: Uuid,
        film_id: Uuid,
    ) -> anyhow::Result<Option<Rating>>;
    async fn list_values_for_film(&self, film_id: Uuid) -> anyhow::Result<Vec<f64>>;
    async fn create(&self, user_id: Uuid, film_id: Uuid, value: f64) -> anyhow::Result<Rating>;
    async fn update_value(&self, id: Uuid, value: f64) -> anyhow::Result<Rating>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PgFilmStore {
    pool: PgPool,
}

impl PgFilmStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FilmStore for PgFilmStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Film>> {
        let film = sqlx::query_as::<_, Film>(
            r#"
            SELECT id, title, release_year, average_rating, total_ratings, created_at
            FROM films
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(film)
    }

    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<Film>> {
        let rows = sqlx::query_as::<_, Film>(
            r#"
            SELECT id, title, release_year, average_rating, total_ratings, created_at
            FROM films
            ORDER BY title ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn write_aggregate(
        &self,
        film_id: Uuid,
        average_rating: f64,
        total_ratings: i64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE films SET average_rating = $1, total_ratings = $2 WHERE id = $3
            "#,
        )
        .bind(average_rating)
        .bind(total_ratings)
        .bind(film_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgRatingStore {
    pool: PgPool,
}

impl PgRatingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RatingStore for PgRatingStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Rating>> {
        let rating = sqlx::query_as::<_, Rating>(
            r#"
            SELECT id, user_id, film_id, value, created_at
            FROM ratings
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rating)
    }

    async fn find_by_user_and_film(
        &self,
        user_id: Uuid,
        film_id: Uuid,
    ) -> anyhow::Result<Option<Rating>> {
        let rating = sqlx::query_as::<_, Rating>(
            r#"
            SELECT id, user_id, film_id, value, created_at
            FROM ratings
            WHERE user_id = $1 AND film_id = $2
            "#,
        )
        .bind(user_id)
        .bind(film_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rating)
    }

    async fn list_values_for_film(&self, film_id: Uuid) -> anyhow::Result<Vec<f64>> {
        let rows: Vec<(f64,)> = sqlx::query_as(
            r#"
            SELECT value FROM ratings WHERE film_id = $1
            "#,
        )
        .bind(film_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    async fn create(&self, user_id: Uuid, film_id: Uuid, value: f64) -> anyhow::Result<Rating> {
        // The (user_id, film_id) unique constraint backstops the service
        // layer's duplicate pre-check under concurrency.
        let rating = sqlx::query_as::<_, Rating>(
            r#"
            INSERT INTO ratings (user_id, film_id, value)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, film_id, value, created_at
            "#,
        )
        .bind(user_id)
        .bind(film_id)
        .bind(value)
        .fetch_one(&self.pool)
        .await?;
        Ok(rating)
    }

    async fn update_value(&self, id: Uuid, value: f64) -> anyhow::Result<Rating> {
        let rating = sqlx::query_as::<_, Rating>(
            r#"
            UPDATE ratings SET value = $1 WHERE id = $2
            RETURNING id, user_id, film_id, value, created_at
            "#,
        )
        .bind(value)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(rating)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(r#"DELETE FROM ratings WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
