use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::films::repo::{Film, Rating};
use crate::films::service::FilmAggregate;

#[derive(Debug, Serialize)]
pub struct FilmSummary {
    pub id: Uuid,
    pub title: String,
    pub release_year: Option<i32>,
    pub average_rating: f64,
    pub total_ratings: i64,
}

impl From<Film> for FilmSummary {
    fn from(f: Film) -> Self {
        Self {
            id: f.id,
            title: f.title,
            release_year: f.release_year,
            average_rating: f.average_rating,
            total_ratings: f.total_ratings,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRatingRequest {
    pub rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRatingRequest {
    pub rate: f64,
}

#[derive(Debug, Serialize)]
pub struct RatingResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub film_id: Uuid,
    pub rate: f64,
    pub created_at: OffsetDateTime,
}

impl From<Rating> for RatingResponse {
    fn from(r: Rating) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            film_id: r.film_id,
            rate: r.value,
            created_at: r.created_at,
        }
    }
}

/// A rating mutation answers with the record and the film's fresh aggregate.
#[derive(Debug, Serialize)]
pub struct RatedFilmResponse {
    pub rating: RatingResponse,
    pub average_rating: f64,
    pub total_ratings: i64,
}

impl RatedFilmResponse {
    pub fn new(rating: Rating, aggregate: FilmAggregate) -> Self {
        Self {
            rating: rating.into(),
            average_rating: aggregate.average_rating,
            total_ratings: aggregate.total_ratings,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}
