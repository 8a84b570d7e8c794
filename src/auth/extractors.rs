use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use crate::auth::jwt::JwtKeys;
use crate::error::ApiError;

/// Identity attached to a request once its bearer token checks out.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Authentication("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Authentication("Invalid Authorization header".into()))?;

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err(ApiError::Authentication("Invalid or expired token".into()));
            }
        };

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
        })
    }
}

/// Ownership gate: being logged in is not being entitled. Mismatches reject
/// with the authorization class, distinct from authentication failures.
pub fn ensure_owner(user: &AuthUser, owner_id: Uuid) -> Result<(), ApiError> {
    if user.id == owner_id {
        Ok(())
    } else {
        warn!(user_id = %user.id, owner_id = %owner_id, "ownership check failed");
        Err(ApiError::Authorization(
            "You do not own this resource".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_owner_accepts_matching_identity() {
        let id = Uuid::new_v4();
        let user = AuthUser {
            id,
            email: "user@example.com".into(),
        };
        assert!(ensure_owner(&user, id).is_ok());
    }

    #[test]
    fn ensure_owner_rejects_other_identity() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: "user@example.com".into(),
        };
        let err = ensure_owner(&user, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));
    }
}
