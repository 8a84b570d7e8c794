use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, films};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(films::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{json_body, json_request, test_state};
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    /// Walks the whole account lifecycle against the real router: register,
    /// login, rate a film (bad then good), recover the password, and confirm
    /// the credential actually rolled over.
    #[tokio::test]
    async fn full_account_and_rating_flow() {
        let (state, backend) = test_state();
        let app = build_app(state);
        let film = backend.seed_film("Alien");

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/register",
                None,
                &json!({
                    "email": "Rip.Ley@Example.com",
                    "password": "Nostromo#1979",
                    "display_name": "Ripley"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["user"]["email"], "rip.ley@example.com");

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/login",
                None,
                &json!({"email": "rip.ley@example.com", "password": "Nostromo#1979"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["expires_in_seconds"], 36000);
        let token = body["token"].as_str().unwrap().to_string();

        let rate_uri = format!("/api/v1/films/{}/ratings", film.id);
        let res = app
            .clone()
            .oneshot(json_request("POST", &rate_uri, Some(&token), &json!({"rate": 6})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .clone()
            .oneshot(json_request("POST", &rate_uri, Some(&token), &json!({"rate": 4})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = json_body(res).await;
        assert_eq!(body["average_rating"], 4.0);
        assert_eq!(body["total_ratings"], 1);

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/password/forgot",
                None,
                &json!({"email": "rip.ley@example.com"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let reset_token = backend.notifier.last_token().expect("token delivered");

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/password/reset",
                None,
                &json!({"token": "deadbeef", "new_password": "Sulaco#2179x"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/password/reset",
                None,
                &json!({"token": reset_token, "new_password": "Sulaco#2179x"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/login",
                None,
                &json!({"email": "rip.ley@example.com", "password": "Nostromo#1979"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/login",
                None,
                &json!({"email": "rip.ley@example.com", "password": "Sulaco#2179x"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
