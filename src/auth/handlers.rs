use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{AuthResponse, LoginRequest, MeResponse, RegisterRequest},
    extractors::CurrentUser,
    services,
};
use crate::{error::AppError, response::ApiResponse, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<ApiResponse<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    let res = services::register(state.users.as_ref(), &state.jwt, payload).await?;
    Ok(ApiResponse::created(res))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<ApiResponse<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    let res = services::login(state.users.as_ref(), &state.jwt, payload).await?;
    Ok(ApiResponse::ok(res))
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> ApiResponse<MeResponse> {
    ApiResponse::ok(MeResponse { user })
}
