use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::extractors::{ensure_owner, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::films::repo::{Film, Rating};
use crate::state::AppState;

/// Derived statistics written back onto the film record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FilmAggregate {
    pub average_rating: f64,
    pub total_ratings: i64,
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn validate_rate(value: f64) -> ApiResult<()> {
    if (0.0..=5.0).contains(&value) {
        Ok(())
    } else {
        Err(ApiError::validation("rate", "Rating must be between 0 and 5"))
    }
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Full re-scan of the film's ratings: mean rounded to one decimal plus
/// count, written back onto the film. Deliberately not an incremental
/// update; a re-scan cannot drift.
pub async fn recompute_film_aggregate(
    state: &AppState,
    film_id: Uuid,
) -> anyhow::Result<FilmAggregate> {
    let values = state.ratings.list_values_for_film(film_id).await?;
    let total_ratings = values.len() as i64;
    let average_rating = if values.is_empty() {
        0.0
    } else {
        round1(values.iter().sum::<f64>() / values.len() as f64)
    };

    state
        .films
        .write_aggregate(film_id, average_rating, total_ratings)
        .await?;

    Ok(FilmAggregate {
        average_rating,
        total_ratings,
    })
}

/// The rating mutation is the source of truth: a failed recompute is logged
/// and the film's last stored aggregate is served, never rolled back into a
/// request failure.
async fn recompute_or_stale(state: &AppState, film: &Film) -> FilmAggregate {
    match recompute_film_aggregate(state, film.id).await {
        Ok(aggregate) => aggregate,
        Err(e) => {
            warn!(error = %e, film_id = %film.id, "aggregate recompute failed; serving stale values");
            FilmAggregate {
                average_rating: film.average_rating,
                total_ratings: film.total_ratings,
            }
        }
    }
}

pub async fn rate_film(
    state: &AppState,
    user: &AuthUser,
    film_id: Uuid,
    value: f64,
) -> ApiResult<(Rating, FilmAggregate)> {
    validate_rate(value)?;

    let film = state
        .films
        .find_by_id(film_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Film not found".into()))?;

    if state
        .ratings
        .find_by_user_and_film(user.id, film_id)
        .await?
        .is_some()
    {
        warn!(user_id = %user.id, %film_id, "duplicate rating");
        return Err(ApiError::Conflict("You have already rated this film".into()));
    }

    let rating = match state.ratings.create(user.id, film_id, value).await {
        Ok(r) => r,
        // A concurrent duplicate slips past the pre-check and lands on the
        // unique constraint instead.
        Err(e) if is_unique_violation(&e) => {
            warn!(user_id = %user.id, %film_id, "duplicate rating (constraint)");
            return Err(ApiError::Conflict("You have already rated this film".into()));
        }
        Err(e) => return Err(e.into()),
    };

    let aggregate = recompute_or_stale(state, &film).await;
    info!(user_id = %user.id, %film_id, value, "rating created");
    Ok((rating, aggregate))
}

pub async fn change_rating(
    state: &AppState,
    user: &AuthUser,
    rating_id: Uuid,
    value: f64,
) -> ApiResult<(Rating, FilmAggregate)> {
    validate_rate(value)?;

    let existing = state
        .ratings
        .find_by_id(rating_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Rating not found".into()))?;
    ensure_owner(user, existing.user_id)?;

    let film = state
        .films
        .find_by_id(existing.film_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Film not found".into()))?;

    let rating = state.ratings.update_value(rating_id, value).await?;
    let aggregate = recompute_or_stale(state, &film).await;
    info!(user_id = %user.id, %rating_id, value, "rating updated");
    Ok((rating, aggregate))
}

pub async fn remove_rating(
    state: &AppState,
    user: &AuthUser,
    rating_id: Uuid,
) -> ApiResult<FilmAggregate> {
    let existing = state
        .ratings
        .find_by_id(rating_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Rating not found".into()))?;
    ensure_owner(user, existing.user_id)?;

    let film = state
        .films
        .find_by_id(existing.film_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Film not found".into()))?;

    state.ratings.delete(rating_id).await?;
    let aggregate = recompute_or_stale(state, &film).await;
    info!(user_id = %user.id, %rating_id, "rating deleted");
    Ok(aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::films::repo::FilmStore;
    use crate::testsupport::{lazy_pool, test_config, test_state, MemFilmStore};
    use axum::async_trait;
    use std::sync::Arc;

    fn someone() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: "viewer@example.com".into(),
        }
    }

    #[test]
    fn round1_rounds_to_one_decimal() {
        assert_eq!(round1(4.0), 4.0);
        assert_eq!(round1(4.25), 4.3);
        assert_eq!(round1(4.44), 4.4);
        assert_eq!(round1(3.999), 4.0);
        assert_eq!(round1(0.0), 0.0);
    }

    #[tokio::test]
    async fn aggregate_tracks_mean_and_count() {
        let (state, backend) = test_state();
        let film = backend.seed_film("Alien");
        let (first, second, third) = (someone(), someone(), someone());

        rate_film(&state, &first, film.id, 3.0).await.unwrap();
        rate_film(&state, &second, film.id, 5.0).await.unwrap();
        let (_, aggregate) = rate_film(&state, &third, film.id, 4.0).await.unwrap();

        assert_eq!(
            aggregate,
            FilmAggregate {
                average_rating: 4.0,
                total_ratings: 3
            }
        );
        let stored = backend.films.get(film.id).unwrap();
        assert_eq!(stored.average_rating, 4.0);
        assert_eq!(stored.total_ratings, 3);
    }

    #[tokio::test]
    async fn deleting_a_rating_recomputes_the_aggregate() {
        let (state, backend) = test_state();
        let film = backend.seed_film("Alien");
        let (first, second, third) = (someone(), someone(), someone());

        let (low, _) = rate_film(&state, &first, film.id, 3.0).await.unwrap();
        rate_film(&state, &second, film.id, 5.0).await.unwrap();
        rate_film(&state, &third, film.id, 4.0).await.unwrap();

        let aggregate = remove_rating(&state, &first, low.id).await.unwrap();
        assert_eq!(
            aggregate,
            FilmAggregate {
                average_rating: 4.5,
                total_ratings: 2
            }
        );
        let stored = backend.films.get(film.id).unwrap();
        assert_eq!(stored.average_rating, 4.5);
        assert_eq!(stored.total_ratings, 2);
    }

    #[tokio::test]
    async fn empty_rating_set_yields_zeroes() {
        let (state, backend) = test_state();
        let film = backend.seed_film("Alien");
        let viewer = someone();

        let (rating, _) = rate_film(&state, &viewer, film.id, 5.0).await.unwrap();
        let aggregate = remove_rating(&state, &viewer, rating.id).await.unwrap();

        assert_eq!(
            aggregate,
            FilmAggregate {
                average_rating: 0.0,
                total_ratings: 0
            }
        );
    }

    #[tokio::test]
    async fn second_rating_for_same_pair_conflicts_and_leaves_count() {
        let (state, backend) = test_state();
        let film = backend.seed_film("Alien");
        let viewer = someone();

        rate_film(&state, &viewer, film.id, 4.0).await.unwrap();
        let err = rate_film(&state, &viewer, film.id, 2.0).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let stored = backend.films.get(film.id).unwrap();
        assert_eq!(stored.total_ratings, 1);
        assert_eq!(stored.average_rating, 4.0);
    }

    #[tokio::test]
    async fn rating_an_unknown_film_is_not_found() {
        let (state, _backend) = test_state();
        let err = rate_film(&state, &someone(), Uuid::new_v4(), 4.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn out_of_range_values_are_rejected() {
        let (state, backend) = test_state();
        let film = backend.seed_film("Alien");
        for bad in [-0.5, 5.1, 6.0] {
            let err = rate_film(&state, &someone(), film.id, bad).await.unwrap_err();
            assert!(matches!(err, ApiError::Validation { .. }));
        }
    }

    #[tokio::test]
    async fn changing_a_rating_recomputes_the_aggregate() {
        let (state, backend) = test_state();
        let film = backend.seed_film("Alien");
        let viewer = someone();

        let (rating, _) = rate_film(&state, &viewer, film.id, 2.0).await.unwrap();
        let (updated, aggregate) = change_rating(&state, &viewer, rating.id, 5.0).await.unwrap();

        assert_eq!(updated.value, 5.0);
        assert_eq!(
            aggregate,
            FilmAggregate {
                average_rating: 5.0,
                total_ratings: 1
            }
        );
    }

    /// Film store that accepts reads but refuses the aggregate write-back.
    struct ReadOnlyFilms(Arc<MemFilmStore>);

    #[async_trait]
    impl FilmStore for ReadOnlyFilms {
        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Film>> {
            self.0.find_by_id(id).await
        }
        async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<Film>> {
            self.0.list(limit, offset).await
        }
        async fn write_aggregate(&self, _: Uuid, _: f64, _: i64) -> anyhow::Result<()> {
            anyhow::bail!("aggregate storage unavailable")
        }
    }

    #[tokio::test]
    async fn recompute_failure_keeps_the_rating_and_serves_stale_values() {
        let (_, backend) = test_state();
        let film = backend.seed_film("Alien");
        let state = AppState::from_parts(
            lazy_pool(),
            backend.users.clone(),
            Arc::new(ReadOnlyFilms(backend.films.clone())),
            backend.ratings.clone(),
            backend.reset_tokens.clone(),
            backend.notifier.clone(),
            test_config(),
        );
        let viewer = someone();

        let (rating, aggregate) = rate_film(&state, &viewer, film.id, 4.0).await.unwrap();

        // The write went through even though the recompute did not.
        assert_eq!(backend.ratings.all().len(), 1);
        assert_eq!(backend.ratings.all()[0].id, rating.id);
        // Served values are the film's last stored (stale) aggregate.
        assert_eq!(
            aggregate,
            FilmAggregate {
                average_rating: 0.0,
                total_ratings: 0
            }
        );
    }
}
