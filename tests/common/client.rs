//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per endpoint. When API routes or request
//! formats change, update only this file.

#![allow(dead_code)]

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    pub base_url: String,
    owner_id: Option<i64>,
}

impl TestClient {
    /// Creates a client that sends no owner header
    pub fn anonymous(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            owner_id: None,
        }
    }

    /// Creates a client acting on behalf of `owner_id`
    pub fn for_owner(base_url: String, owner_id: i64) -> Self {
        let mut client = Self::anonymous(base_url);
        client.owner_id = Some(owner_id);
        client
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match self.owner_id {
            Some(id) => builder.header("X-Owner-Id", id.to_string()),
            None => builder,
        }
    }

    // ========================================================================
    // Download queue
    // ========================================================================

    pub async fn queue_download(&self, download_type: &str, url: &str) -> Response {
        self.queue_download_body(json!({"url": url, "download_type": download_type}))
            .await
    }

    pub async fn queue_download_body(&self, body: Value) -> Response {
        self.request(reqwest::Method::POST, "/v1/downloads/queue")
            .json(&body)
            .send()
            .await
            .expect("Queue request failed")
    }

    pub async fn my_jobs(&self) -> Response {
        self.request(reqwest::Method::GET, "/v1/downloads/my-jobs")
            .send()
            .await
            .expect("My jobs request failed")
    }

    pub async fn job_status(&self, job_id: &str) -> Response {
        self.request(
            reqwest::Method::GET,
            &format!("/v1/downloads/status/{}", job_id),
        )
        .send()
        .await
        .expect("Job status request failed")
    }

    pub async fn queue_info(&self) -> Response {
        self.request(reqwest::Method::GET, "/v1/downloads/queue-info")
            .send()
            .await
            .expect("Queue info request failed")
    }

    /// Polls a job until it is completed or failed and returns its view.
    ///
    /// # Panics
    ///
    /// Panics if the job does not finish within [`JOB_FINISH_TIMEOUT_MS`].
    pub async fn wait_for_job(&self, job_id: &str) -> Value {
        let start = std::time::Instant::now();
        loop {
            let job: Value = self
                .job_status(job_id)
                .await
                .json()
                .await
                .expect("Job status is not JSON");
            if job["status"] == "completed" || job["status"] == "failed" {
                return job;
            }
            if start.elapsed() > Duration::from_millis(JOB_FINISH_TIMEOUT_MS) {
                panic!("Job {} did not finish: {}", job_id, job);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    // ========================================================================
    // Uploads and storage
    // ========================================================================

    pub async fn upload(&self, filename: &str, data: Vec<u8>) -> Response {
        let part = reqwest::multipart::Part::bytes(data).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        self.request(reqwest::Method::POST, "/v1/music/upload")
            .multipart(form)
            .send()
            .await
            .expect("Upload request failed")
    }

    pub async fn storage(&self) -> Response {
        self.request(reqwest::Method::GET, "/v1/music/storage")
            .send()
            .await
            .expect("Storage request failed")
    }
}
