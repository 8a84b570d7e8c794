use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

use super::dto::{
    CreateRatingRequest, FilmSummary, Pagination, RatedFilmResponse, UpdateRatingRequest,
};
use super::service::{self, FilmAggregate};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/films", get(list_films))
        .route("/films/:id", get(get_film))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/films/:id/ratings", post(create_rating))
        .route("/ratings/:id", put(update_rating).delete(delete_rating))
}

#[instrument(skip(state))]
pub async fn list_films(
    State(state): State<AppState>,
    Query(p): Query<Pagination>,
) -> ApiResult<Json<Vec<FilmSummary>>> {
    let films = state.films.list(p.limit, p.offset).await?;
    Ok(Json(films.into_iter().map(FilmSummary::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_film(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FilmSummary>> {
    let film = state
        .films
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Film not found".into()))?;
    Ok(Json(film.into()))
}

#[instrument(skip(state))]
pub async fn create_rating(
    State(state): State<AppState>,
    user: AuthUser,
    Path(film_id): Path<Uuid>,
    Json(body): Json<CreateRatingRequest>,
) -> ApiResult<(StatusCode, HeaderMap, Json<RatedFilmResponse>)> {
    let (rating, aggregate) = service::rate_film(&state, &user, film_id, body.rate).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/ratings/{}", rating.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }

    Ok((
        StatusCode::CREATED,
        headers,
        Json(RatedFilmResponse::new(rating, aggregate)),
    ))
}

#[instrument(skip(state))]
pub async fn update_rating(
    State(state): State<AppState>,
    user: AuthUser,
    Path(rating_id): Path<Uuid>,
    Json(body): Json<UpdateRatingRequest>,
) -> ApiResult<Json<RatedFilmResponse>> {
    let (rating, aggregate) = service::change_rating(&state, &user, rating_id, body.rate).await?;
    Ok(Json(RatedFilmResponse::new(rating, aggregate)))
}

#[instrument(skip(state))]
pub async fn delete_rating(
    State(state): State<AppState>,
    user: AuthUser,
    Path(rating_id): Path<Uuid>,
) -> ApiResult<Json<FilmAggregate>> {
    let aggregate = service::remove_rating(&state, &user, rating_id).await?;
    Ok(Json(aggregate))
}
