//! Route handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use ondemand_activation::ActivationError;
use ondemand_state::ActivationState;

use crate::ApiState;

const TEXT_PLAIN: &str = "text/plain";

/// First value of `key`, matching how repeated query parameters are read.
fn first<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn text(status: StatusCode, body: String) -> Response {
    (status, [(CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

/// Map a decided state to its HTTP answer.
pub fn state_response(state: ActivationState) -> Response {
    match state {
        ActivationState::Started => text(StatusCode::CREATED, state.to_string()),
        ActivationState::Starting => text(StatusCode::ACCEPTED, state.to_string()),
        ActivationState::Unknown => text(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unknown state {state}"),
        ),
    }
}

fn error_response(err: &ActivationError) -> Response {
    text(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// GET /?name=<name>&timeout=<duration>
pub async fn activate(
    State(state): State<ApiState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let name = first(&params, "name");
    match state.activator.handle(name, first(&params, "timeout")).await {
        Ok(decided) => state_response(decided),
        Err(e) => {
            if e.is_client_error() {
                debug!(error = %e, "rejected activation request");
            } else {
                warn!(name = name.unwrap_or_default(), error = %e, "activation failed");
            }
            error_response(&e)
        }
    }
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, ondemand_metrics::CONTENT_TYPE)],
        state.metrics.render(),
    )
}
