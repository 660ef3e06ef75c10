use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tracing::info;

use super::download_routes::download_routes;
use super::upload_routes::upload_routes;
use super::{log_requests, state::*, ServerConfig};
use crate::download_manager::{DownloadManager, QueueStats};
use crate::ingestion::IngestionPipeline;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub queue: QueueStats,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        queue: state.download_manager.queue_stats(),
    };
    Json(stats)
}

impl ServerState {
    fn new(
        config: ServerConfig,
        download_manager: Arc<DownloadManager>,
        pipeline: IngestionPipeline,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            download_manager,
            pipeline,
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

pub fn make_app(
    config: ServerConfig,
    download_manager: Arc<DownloadManager>,
    pipeline: IngestionPipeline,
) -> Result<Router> {
    let state = ServerState::new(config.clone(), download_manager, pipeline);

    let app: Router = Router::new()
        .route("/", get(home))
        .nest("/v1/downloads", download_routes())
        .nest("/v1/music", upload_routes(config.max_upload_bytes))
        .layer(middleware::from_fn_with_state(config, log_requests))
        .with_state(state);

    Ok(app)
}

pub async fn run_server(
    config: ServerConfig,
    download_manager: Arc<DownloadManager>,
    pipeline: IngestionPipeline,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, download_manager, pipeline)?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Listening on port {}", port);

    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download_manager::{
        AcquisitionBackend, AcquisitionError, JobKind, JobScheduler, JobView,
    };
    use crate::ingestion::testing::{fake_audio, KeyValueInspector};
    use crate::ingestion::FileHandler;
    use crate::library::{LibraryStore, SqliteLibraryStore, StorageAccountant, StorageUsage};
    use crate::server::download_routes::MyJobsResponse;
    use crate::server::upload_routes::UploadResponse;
    use crate::server::{RequestsLoggingLevel, HEADER_OWNER_ID_KEY};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde::de::DeserializeOwned;
    use tempfile::TempDir;
    use tower::ServiceExt; // for `oneshot`

    const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

    /// Never produces anything, so jobs fail quickly without touching the network.
    struct EmptyBackend;

    #[async_trait]
    impl AcquisitionBackend for EmptyBackend {
        async fn fetch(&self, _: JobKind, _: &str, _: &std::path::Path) -> Result<(), AcquisitionError> {
            Ok(())
        }
    }

    struct TestApp {
        _root: TempDir,
        store: Arc<SqliteLibraryStore>,
        app: Router,
    }

    fn test_app(quota_mb: f64) -> TestApp {
        let root = TempDir::new().unwrap();
        let store = Arc::new(SqliteLibraryStore::in_memory().unwrap());
        let pipeline = IngestionPipeline::new(
            store.clone(),
            StorageAccountant::new(store.clone(), quota_mb),
            FileHandler::new(root.path().join("library"), root.path().join("tmp")),
            Arc::new(KeyValueInspector),
        );
        let manager = Arc::new(DownloadManager::new(
            Arc::new(JobScheduler::new(2)),
            Arc::new(EmptyBackend),
            pipeline.clone(),
        ));
        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            ..Default::default()
        };
        let app = make_app(config, manager, pipeline).unwrap();
        TestApp {
            _root: root,
            store,
            app,
        }
    }

    fn json_request(method: &str, uri: &str, owner: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(owner) = owner {
            builder = builder.header(HEADER_OWNER_ID_KEY, owner);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, owner: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(owner) = owner {
            builder = builder.header(HEADER_OWNER_ID_KEY, owner);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn upload_request(owner: &str, filename: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/v1/music/upload")
            .header(HEADER_OWNER_ID_KEY, owner)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(
            format_uptime(Duration::from_secs(2 * 86_400 + 3 * 3600 + 4 * 60 + 5)),
            "2d 03:04:05"
        );
    }

    #[tokio::test]
    async fn responds_unauthorized_without_owner() {
        let t = test_app(100.0);

        let routes = [
            "/v1/downloads/my-jobs",
            "/v1/downloads/status/abc",
            "/v1/downloads/queue-info",
            "/v1/music/storage",
        ];
        for route in routes {
            let response = t.app.clone().oneshot(get_request(route, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", route);
        }

        let response = t
            .app
            .clone()
            .oneshot(get_request("/v1/downloads/my-jobs", Some("not-a-number")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn queue_rejects_bad_requests() {
        let t = test_app(100.0);

        let bodies = [
            serde_json::json!({"url": "https://example.com/x", "download_type": "bandcamp"}),
            serde_json::json!({"url": "", "download_type": "youtube"}),
            serde_json::json!({"url": "ftp://example.com/x", "download_type": "spotify"}),
            serde_json::json!({"download_type": "youtube"}),
        ];
        for body in bodies {
            let response = t
                .app
                .clone()
                .oneshot(json_request("POST", "/v1/downloads/queue", Some("1"), body.clone()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
        }

        let response = t
            .app
            .clone()
            .oneshot(get_request("/v1/downloads/queue-info", Some("1")))
            .await
            .unwrap();
        let stats: QueueStats = read_json(response).await;
        assert_eq!(stats.queue_length + stats.processing_count, 0);
        assert_eq!(stats.max_concurrent, 2);
    }

    #[tokio::test]
    async fn queued_job_is_visible_only_to_its_owner() {
        let t = test_app(100.0);

        let response = t
            .app
            .clone()
            .oneshot(json_request(
                "POST",
                "/v1/downloads/queue",
                Some("7"),
                serde_json::json!({"url": "https://youtu.be/abc", "download_type": "youtube"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let job: JobView = read_json(response).await;
        assert_eq!(job.kind, JobKind::Youtube);
        assert_eq!(job.url, "https://youtu.be/abc");

        let status_uri = format!("/v1/downloads/status/{}", job.id);
        let response = t
            .app
            .clone()
            .oneshot(get_request(&status_uri, Some("7")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched: JobView = read_json(response).await;
        assert_eq!(fetched.id, job.id);

        let response = t
            .app
            .clone()
            .oneshot(get_request(&status_uri, Some("8")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = t
            .app
            .clone()
            .oneshot(get_request("/v1/downloads/status/nope", Some("7")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = t
            .app
            .clone()
            .oneshot(get_request("/v1/downloads/my-jobs", Some("7")))
            .await
            .unwrap();
        let mine: MyJobsResponse = read_json(response).await;
        assert_eq!(mine.jobs.len(), 1);

        let response = t
            .app
            .clone()
            .oneshot(get_request("/v1/downloads/my-jobs", Some("8")))
            .await
            .unwrap();
        let theirs: MyJobsResponse = read_json(response).await;
        assert!(theirs.jobs.is_empty());
    }

    #[tokio::test]
    async fn upload_maps_outcomes_to_statuses() {
        let t = test_app(100.0);
        let song = fake_audio(&[("title", "Uploaded Song"), ("artist", "Someone")]);

        let response = t
            .app
            .clone()
            .oneshot(upload_request("3", "song.mp3", &song))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let uploaded: UploadResponse = read_json(response).await;
        assert_eq!(uploaded.title, "Uploaded Song");
        assert!(t.store.get_track(uploaded.track_id).unwrap().is_some());

        let response = t
            .app
            .clone()
            .oneshot(upload_request("3", "again.mp3", &song))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = t
            .app
            .clone()
            .oneshot(upload_request("3", "notes.txt", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let broken = fake_audio(&[("corrupt", "yes")]);
        let response = t
            .app
            .clone()
            .oneshot(upload_request("3", "broken.flac", &broken))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = t
            .app
            .clone()
            .oneshot(get_request("/v1/music/storage", Some("3")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let usage: StorageUsage = read_json(response).await;
        assert_eq!(usage.quota_mb, 100.0);
        assert!((usage.used_mb - uploaded.file_size_mb).abs() < 1e-9);
    }

    #[tokio::test]
    async fn upload_over_quota_is_rejected() {
        let t = test_app(0.0);
        let song = fake_audio(&[("title", "Too Big")]);

        let response = t
            .app
            .clone()
            .oneshot(upload_request("4", "big.mp3", &song))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(t.store.get_tracks_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn home_reports_queue() {
        let t = test_app(100.0);
        let response = t.app.clone().oneshot(get_request("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = read_json(response).await;
        assert_eq!(body["queue"]["max_concurrent"], 2);
        assert!(body["uptime"].as_str().unwrap().starts_with("0d"));
    }
}
