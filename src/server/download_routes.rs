//! Download queue HTTP routes.
//!
//! - POST /queue - admit a Spotify or YouTube download
//! - GET /my-jobs - the caller's jobs, newest first
//! - GET /status/{id} - a single job
//! - GET /queue-info - queue statistics

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::download_manager::{JobTags, JobView, LookupError};
use crate::library::TagId;
use crate::server::owner::Owner;
use crate::server::state::{GuardedDownloadManager, ServerState};

#[derive(Debug, Deserialize)]
pub struct QueueDownloadBody {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub download_type: String,
    #[serde(default)]
    pub tag_id: Option<TagId>,
    #[serde(default)]
    pub global_tag_id: Option<TagId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MyJobsResponse {
    pub jobs: Vec<JobView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(super) fn error_response(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// POST /queue
async fn queue_download(
    owner: Owner,
    State(dm): State<GuardedDownloadManager>,
    Json(body): Json<QueueDownloadBody>,
) -> impl IntoResponse {
    let tags = JobTags {
        tag_id: body.tag_id,
        global_tag_id: body.global_tag_id,
    };
    match dm.submit(owner.id, &body.download_type, &body.url, tags) {
        Ok(job) => (StatusCode::ACCEPTED, Json(job.view())).into_response(),
        Err(e) => {
            debug!("Owner {} download request rejected: {}", owner.id, e);
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

/// GET /my-jobs
async fn get_my_jobs(owner: Owner, State(dm): State<GuardedDownloadManager>) -> impl IntoResponse {
    let jobs = dm.list_jobs(owner.id).iter().map(|j| j.view()).collect();
    Json(MyJobsResponse { jobs })
}

/// GET /status/{id}
async fn get_job_status(
    owner: Owner,
    State(dm): State<GuardedDownloadManager>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match dm.get_job(&job_id, owner.id) {
        Ok(job) => Json(job.view()).into_response(),
        Err(e @ LookupError::NotFound) => error_response(StatusCode::NOT_FOUND, e.to_string()),
        Err(e @ LookupError::Forbidden) => error_response(StatusCode::FORBIDDEN, e.to_string()),
    }
}

/// GET /queue-info
async fn get_queue_info(_owner: Owner, State(dm): State<GuardedDownloadManager>) -> impl IntoResponse {
    Json(dm.queue_stats())
}

pub fn download_routes() -> Router<ServerState> {
    Router::new()
        .route("/queue", post(queue_download))
        .route("/my-jobs", get(get_my_jobs))
        .route("/status/{id}", get(get_job_status))
        .route("/queue-info", get(get_queue_info))
}
