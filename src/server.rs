//! HTTP intake and job inspection over axum.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `POST /send-email` | Queue a batch ([`BatchRequest`] body) |
//! | `GET /jobs?status=` | List jobs, optionally by status |
//! | `GET /jobs/{id}` | One job |
//! | `GET /health` | Per-status job counts |
//!
//! Sender secrets never appear in responses.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::error::QueueError;
use crate::intake::{BatchIntake, BatchRequest};
use crate::job::{DeliveryJob, JobId, JobStatus};
use crate::storage::{JobStore, StatusCounts};

const QUEUED_MESSAGE: &str = "Emails queued successfully!";
const STORAGE_MESSAGE: &str = "Database Error";

#[derive(Clone)]
struct AppState {
    intake: BatchIntake,
    store: Arc<dyn JobStore>,
}

/// Build the service router around `intake` and the store it writes to.
pub fn create_router(intake: BatchIntake) -> Router {
    let store = Arc::clone(intake.store());
    let state = AppState { intake, store };

    Router::new()
        .route("/send-email", post(send_email))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve `router` on `addr` until Ctrl+C or SIGTERM.
pub async fn serve(addr: SocketAddr, router: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    if let Ok(local) = listener.local_addr() {
        tracing::info!(addr = %local, "Listening");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Body of a `POST /send-email` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued: Option<usize>,
    #[serde(default, rename = "jobIds", skip_serializing_if = "Option::is_none")]
    pub job_ids: Option<Vec<JobId>>,
}

impl SubmitResponse {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
            queued: None,
            job_ids: None,
        }
    }
}

/// POST /send-email - Validate and queue a batch.
async fn send_email(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> (StatusCode, Json<SubmitResponse>) {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(SubmitResponse::rejected(format!(
                    "Error: Invalid request body. {}",
                    rejection.body_text()
                ))),
            )
        }
    };

    match state.intake.submit(request).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(SubmitResponse {
                accepted: true,
                message: QUEUED_MESSAGE.to_string(),
                queued: Some(receipt.queued()),
                job_ids: Some(receipt.job_ids),
            }),
        ),
        Err(e) => {
            let ApiError { status, message } = ApiError::from(e);
            (status, Json(SubmitResponse::rejected(message)))
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    status: Option<String>,
}

/// GET /jobs - List jobs (secrets redacted).
async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DeliveryJob>>, ApiError> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<JobStatus>().map_err(ApiError::bad_request)?),
        None => None,
    };
    let jobs = state.store.list(status).await?;
    Ok(Json(jobs.iter().map(DeliveryJob::redacted).collect()))
}

/// GET /jobs/{id} - One job (secret redacted).
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeliveryJob>, ApiError> {
    let id: JobId = id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid job id: {}", id)))?;
    match state.store.get(id).await? {
        Some(job) => Ok(Json(job.redacted())),
        None => Err(ApiError {
            status: StatusCode::NOT_FOUND,
            message: format!("Job {} not found", id),
        }),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub jobs: StatusCounts,
}

/// GET /health - Per-status counts.
async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let jobs = state.store.count_by_status().await.map_err(|e| {
        tracing::error!(error = %e, "Health check failed");
        ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: STORAGE_MESSAGE.to_string(),
        }
    })?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        jobs,
    }))
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = match err {
            QueueError::Validation(message) => message,
            other => {
                tracing::error!(error = %other, "Request failed");
                STORAGE_MESSAGE.to_string()
            }
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
