use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;
use tracing::error;

use super::AppState;
use crate::poll::{CycleOutcome, CycleStats};

/// Create the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health))
        .route("/pollz", post(pollz))
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
struct PollResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<CycleStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run a poll cycle now. Returns `skipped` if one is already in progress.
///
/// The cycle runs on its own task so a client disconnecting mid-cycle does
/// not abandon it between a send and the matching save.
async fn pollz(State(state): State<AppState>) -> Response {
    let scheduler = state.scheduler.clone();
    let outcome = match tokio::spawn(async move { scheduler.run_cycle().await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Triggered poll cycle task failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PollResponse {
                    status: "failed",
                    stats: None,
                    error: Some(e.to_string()),
                }),
            )
                .into_response();
        }
    };

    match outcome {
        Ok(CycleOutcome::Completed(stats)) => Json(PollResponse {
            status: "completed",
            stats: Some(stats),
            error: None,
        })
        .into_response(),
        Ok(CycleOutcome::Skipped) => Json(PollResponse {
            status: "skipped",
            stats: None,
            error: None,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Triggered poll cycle failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PollResponse {
                    status: "failed",
                    stats: None,
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}
