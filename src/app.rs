use std::net::SocketAddr;

use axum::{middleware, routing::get, Router};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    auth,
    error::{expose_error_detail, route_not_found},
    expenses,
    response::ApiResponse,
    state::AppState,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

pub async fn health() -> ApiResponse<Health> {
    ApiResponse::ok(Health {
        status: "ok".into(),
        timestamp: OffsetDateTime::now_utc(),
    })
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(expenses::router())
        .route("/health", get(health))
}

pub fn build_app(state: AppState) -> Router {
    with_middleware(routes(), state)
}

/// Fallback, state, error-detail exposure (development only), CORS and tracing.
fn with_middleware(routes: Router<AppState>, state: AppState) -> Router {
    let development = state.config.is_development();

    let mut router = routes.fallback(route_not_found).with_state(state);

    if development {
        router = router.layer(middleware::map_response(expose_error_detail));
    }

    router.layer(CorsLayer::permissive()).layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                tracing::info_span!(
                    "http_request",
                    %method,
                    uri = %uri,
                    status = tracing::field::Empty
                )
            })
            .on_response(
                |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                    let status = res.status();
                    span.record("status", tracing::field::display(status));
                    let latency_ms = latency.as_millis() as u64;
                    if status.is_server_error() {
                        tracing::error!(%status, latency_ms, "response");
                    } else {
                        tracing::info!(%status, latency_ms, "response");
                    }
                },
            ),
    )
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
