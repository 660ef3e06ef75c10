//! Direct upload and storage usage routes.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::download_routes::error_response;
use crate::ingestion::{IngestionError, IngestionPipeline};
use crate::library::TrackId;
use crate::server::owner::Owner;
use crate::server::state::ServerState;

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub track_id: TrackId,
    pub title: String,
    pub file_size_mb: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DuplicateResponse {
    pub error: String,
    pub track_id: TrackId,
}

fn upload_error_response(err: IngestionError) -> axum::response::Response {
    match err {
        IngestionError::Duplicate { title, track_id } => (
            StatusCode::CONFLICT,
            Json(DuplicateResponse {
                error: format!("'{}' is already in the library", title),
                track_id,
            }),
        )
            .into_response(),
        e @ IngestionError::QuotaExceeded { .. } => {
            error_response(StatusCode::PAYLOAD_TOO_LARGE, e.to_string())
        }
        e @ IngestionError::UnsupportedFileType(_) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        e => error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    }
}

/// POST /upload - multipart/form-data with a `file` field
async fn upload_file(
    owner: Owner,
    State(pipeline): State<IngestionPipeline>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut filename: Option<String> = None;
    let mut data: Option<Vec<u8>> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart upload from owner {}: {}", owner.id, e);
                return error_response(e.status(), e.body_text());
            }
        };
        if field.name() != Some("file") {
            continue;
        }
        filename = field.file_name().map(|s| s.to_string());
        match field.bytes().await {
            Ok(bytes) => data = Some(bytes.to_vec()),
            Err(e) => {
                warn!("Failed to read file data: {}", e);
                return error_response(e.status(), "Failed to read file");
            }
        }
    }

    let filename = match filename {
        Some(f) if !f.is_empty() => f,
        _ => return error_response(StatusCode::BAD_REQUEST, "No filename provided"),
    };
    let data = match data {
        Some(d) if !d.is_empty() => d,
        _ => return error_response(StatusCode::BAD_REQUEST, "No file data provided"),
    };

    debug!(
        "Owner {} uploading file: {} ({:#})",
        owner.id,
        filename,
        byte_unit::Byte::from(data.len())
    );

    match pipeline.ingest_upload(owner.id, &filename, &data).await {
        Ok(track) => {
            info!("Owner {} uploaded track {} '{}'", owner.id, track.id, track.title);
            (
                StatusCode::CREATED,
                Json(UploadResponse {
                    message: "Upload completed".to_string(),
                    track_id: track.id,
                    title: track.title,
                    file_size_mb: track.file_size_mb,
                }),
            )
                .into_response()
        }
        Err(e) => {
            if e.is_skip() {
                info!("Upload '{}' from owner {} skipped: {}", filename, owner.id, e);
            } else {
                warn!("Upload '{}' from owner {} failed: {}", filename, owner.id, e);
            }
            upload_error_response(e)
        }
    }
}

/// GET /storage
async fn get_storage(owner: Owner, State(pipeline): State<IngestionPipeline>) -> impl IntoResponse {
    let accountant = pipeline.accountant();
    let usage = accountant
        .ensure_owner(owner.id)
        .and_then(|_| accountant.usage(owner.id));
    match usage {
        Ok(usage) => Json(usage).into_response(),
        Err(e) => {
            warn!("Failed to read storage usage for owner {}: {:#}", owner.id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read storage usage")
        }
    }
}

pub fn upload_routes(max_upload_bytes: usize) -> Router<ServerState> {
    let upload_route = Router::new()
        .route("/upload", post(upload_file))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    Router::new()
        .merge(upload_route)
        .route("/storage", get(get_storage))
}
