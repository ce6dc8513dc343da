//! HTTP surface over the email log.
//!
//! Thin request/response mapping only — listing records for the
//! frontend, plus on-demand processing and forwarding of a single
//! record. All real work happens in the store, processor and sender.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::json;
use tracing::error;

use crate::error::{ApiError, Error, StoreError};
use crate::processor::Processor;
use crate::sender::{MailSender, SendOutcome};
use crate::store::{EmailLogStore, EmailRecord};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EmailLogStore>,
    pub processor: Arc<Processor>,
    /// Absent when RECIPIENTS is not configured.
    pub sender: Option<Arc<MailSender>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/logs", get(list_logs))
        .route("/logs/{id}", get(get_log))
        .route("/logs/{id}/process", post(process_log))
        .route("/logs/{id}/forward", post(forward_log))
        .with_state(state)
}

/// All records, oldest first.
async fn list_logs(State(state): State<AppState>) -> Result<Json<Vec<EmailRecord>>, AppError> {
    let records = state.store.list_all().await?;
    Ok(Json(records))
}

async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<EmailRecord>, AppError> {
    let record = state
        .store
        .get(id)
        .await?
        .ok_or(StoreError::NotFound(id))?;
    Ok(Json(record))
}

/// Synchronously process one record and return the result. Permitted
/// for already-processed records; the new result replaces the old.
async fn process_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<EmailRecord>, AppError> {
    let record = state.processor.process_by_id(id).await?;
    Ok(Json(record))
}

/// Forward one record to the configured recipient list, returning one
/// outcome per recipient.
async fn forward_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<SendOutcome>>, AppError> {
    let sender = state
        .sender
        .as_ref()
        .ok_or(ApiError::ForwardingDisabled)?;
    let record = state
        .store
        .get(id)
        .await?
        .ok_or(StoreError::NotFound(id))?;
    let outcomes = sender.forward(&record).await.map_err(Error::Send)?;
    Ok(Json(outcomes))
}

/// Maps service errors onto HTTP status codes with a JSON body.
#[derive(Debug)]
pub struct AppError(Error);

impl<E> From<E> for AppError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Api(ApiError::ForwardingDisabled) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Gateway(_) | Error::Send(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
