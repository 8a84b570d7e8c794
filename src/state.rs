use std::sync::Arc;

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::repo::{PgUserStore, UserStore};
use crate::auth::reset::{PgResetTokenStore, ResetTokenStore};
use crate::config::AppConfig;
use crate::films::repo::{FilmStore, PgFilmStore, PgRatingStore, RatingStore};
use crate::notify::{LogNotifier, ResetNotifier};

/// Process-wide service graph, built once at startup and cloned into
/// handlers. Each component sees only the narrow store trait it needs.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub users: Arc<dyn UserStore>,
    pub films: Arc<dyn FilmStore>,
    pub ratings: Arc<dyn RatingStore>,
    pub reset_tokens: Arc<dyn ResetTokenStore>,
    pub notifier: Arc<dyn ResetNotifier>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        Ok(Self {
            users: Arc::new(PgUserStore::new(db.clone())),
            films: Arc::new(PgFilmStore::new(db.clone())),
            ratings: Arc::new(PgRatingStore::new(db.clone())),
            reset_tokens: Arc::new(PgResetTokenStore::new(db.clone())),
            notifier: Arc::new(LogNotifier),
            config,
            db,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        db: PgPool,
        users: Arc<dyn UserStore>,
        films: Arc<dyn FilmStore>,
        ratings: Arc<dyn RatingStore>,
        reset_tokens: Arc<dyn ResetTokenStore>,
        notifier: Arc<dyn ResetNotifier>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            users,
            films,
            ratings,
            reset_tokens,
            notifier,
            config,
        }
    }

    /// State backed by in-memory stores, for tests that only need wiring.
    #[cfg(test)]
    pub fn fake() -> Self {
        crate::testsupport::test_state().0
    }
}
