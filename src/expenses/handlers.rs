use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        CreateExpenseRequest, ExpensePage, ExpenseResponse, ExpenseSummary, ListQuery,
        SummaryQuery, UpdateExpenseRequest,
    },
    services, validation,
};
use crate::{auth::extractors::CurrentUser, error::AppError, response::ApiResponse, state::AppState};

pub fn expense_routes() -> Router<AppState> {
    Router::new()
        .route("/expenses", post(create_expense).get(list_expenses))
        .route("/expenses/summary", get(expense_summary))
        .route(
            "/expenses/:id",
            get(get_expense).patch(update_expense).delete(delete_expense),
        )
}

#[instrument(skip(state, payload))]
pub async fn create_expense(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<CreateExpenseRequest>, JsonRejection>,
) -> Result<ApiResponse<ExpenseResponse>, AppError> {
    let Json(payload) = payload?;
    let input = validation::validate_create(payload)?;
    let expense = services::create(state.expenses.as_ref(), user.id, input).await?;
    Ok(ApiResponse::created(ExpenseResponse { expense }))
}

#[instrument(skip(state))]
pub async fn list_expenses(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<ApiResponse<ExpensePage>, AppError> {
    let Query(query) = query?;
    let params = validation::validate_list_query(&query)?;
    let page = services::list(state.expenses.as_ref(), user.id, &params).await?;
    Ok(ApiResponse::ok(page))
}

#[instrument(skip(state))]
pub async fn expense_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    query: Result<Query<SummaryQuery>, QueryRejection>,
) -> Result<ApiResponse<ExpenseSummary>, AppError> {
    let Query(query) = query?;
    let range = validation::validate_summary_query(&query)?;
    let summary = services::summary(state.expenses.as_ref(), user.id, &range).await?;
    Ok(ApiResponse::ok(summary))
}

#[instrument(skip(state))]
pub async fn get_expense(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<ApiResponse<ExpenseResponse>, AppError> {
    let Path(id) = id?;
    let expense = services::get_by_id(state.expenses.as_ref(), user.id, id).await?;
    Ok(ApiResponse::ok(ExpenseResponse { expense }))
}

#[instrument(skip(state, payload))]
pub async fn update_expense(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateExpenseRequest>, JsonRejection>,
) -> Result<ApiResponse<ExpenseResponse>, AppError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let changes = validation::validate_update(payload)?;
    let expense = services::update(state.expenses.as_ref(), user.id, id, changes).await?;
    Ok(ApiResponse::ok(ExpenseResponse { expense }))
}

#[instrument(skip(state))]
pub async fn delete_expense(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    services::delete(state.expenses.as_ref(), user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
