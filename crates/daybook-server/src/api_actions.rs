//! HTTP entry point for action invocation.

use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use daybook_actions::ActionError;
use daybook_db::StoreError;
use serde_json::{json, Value};
use std::sync::Arc;

/// Handler for `POST /api/actions/{name}`.
///
/// The request body is the action input (defaulting to `{}` when absent);
/// the response body is the action output, or `{"error": ...}` with a
/// status mapped from the failure.
pub async fn invoke_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
    input: Option<Json<Value>>,
) -> Response {
    let input = input.map(|Json(value)| value).unwrap_or_else(|| json!({}));

    match state.dispatcher.invoke(&name, &input) {
        Ok(output) => Json(output).into_response(),
        Err(e) => {
            let status = status_for(&e);
            tracing::debug!(
                action = %name,
                status = status.as_u16(),
                error = %e,
                "action request failed"
            );
            (status, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}

fn status_for(error: &ActionError) -> StatusCode {
    match error {
        ActionError::UnknownAction(_) => StatusCode::NOT_FOUND,
        ActionError::Validation(_) => StatusCode::BAD_REQUEST,
        // Malformed inputs that the store rejects (bad filter columns,
        // unusable field values) are client errors too.
        ActionError::Store(
            StoreError::UnknownColumn { .. }
            | StoreError::UnknownEntity(_)
            | StoreError::UnknownRelation(_)
            | StoreError::UnsupportedValue { .. }
            | StoreError::MissingId { .. },
        ) => StatusCode::BAD_REQUEST,
        _ if error.is_not_found() => StatusCode::NOT_FOUND,
        _ if error.is_constraint() => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
