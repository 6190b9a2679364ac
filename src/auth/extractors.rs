use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::{error, warn};

use super::{
    dto::PublicUser,
    jwt::TokenError,
};
use crate::{error::AppError, state::AppState};

/// The authenticated caller, resolved from a `Bearer` token to a live user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub PublicUser);

/// Returns the token after the literal `Bearer ` prefix, if any.
pub(crate) fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            AppError::Unauthenticated("You are not logged in, please log in to get access".into())
        })?;

        let claims = state.jwt.verify(token).map_err(|e| match e {
            TokenError::Expired => AppError::TokenExpired,
            TokenError::Invalid => AppError::TokenInvalid,
        })?;

        let user = state
            .users
            .find_public_by_id(claims.sub)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %claims.sub, "user lookup failed");
                AppError::from(e)
            })?;

        match user {
            Some(user) => Ok(CurrentUser(user)),
            None => {
                warn!(user_id = %claims.sub, "token for missing user");
                Err(AppError::Unauthenticated(
                    "The user belonging to this token no longer exists".into(),
                ))
            }
        }
    }
}
