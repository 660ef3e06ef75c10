//! Data models for the download manager.
//!
//! Defines jobs, their statuses, the wire views and admission errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingestion::{ImportShape, ImportSource};
use crate::library::{OwnerId, TagId};

/// Which external tool acquires a job's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Spotify,
    Youtube,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Spotify => "spotify",
            JobKind::Youtube => "youtube",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spotify" => Some(JobKind::Spotify),
            "youtube" => Some(JobKind::Youtube),
            _ => None,
        }
    }

    pub fn import_source(&self) -> ImportSource {
        match self {
            JobKind::Spotify => ImportSource::Spotify,
            JobKind::Youtube => ImportSource::Youtube,
        }
    }

    /// Whether `url` names a single track, an album or a playlist.
    pub fn detect_shape(&self, url: &str) -> ImportShape {
        match self {
            JobKind::Spotify if url.contains("/playlist/") => ImportShape::Playlist,
            JobKind::Spotify if url.contains("/album/") => ImportShape::Album,
            JobKind::Youtube if url.contains("playlist") || url.contains("list=") => {
                ImportShape::Playlist
            }
            _ => ImportShape::Track,
        }
    }
}

/// Status of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed, // terminal
    Failed,    // terminal
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

pub const MESSAGE_ADDED: &str = "Added to queue";
pub const MESSAGE_DOWNLOADING: &str = "Downloading...";
pub const MESSAGE_COMPLETED: &str = "Download completed successfully";
pub const MESSAGE_FAILED: &str = "Download failed";

pub fn queued_message(position: usize) -> String {
    format!("Position {} in queue", position)
}

/// Tags to apply to every track a job ingests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobTags {
    pub tag_id: Option<TagId>,
    pub global_tag_id: Option<TagId>,
}

/// A download job. Only the scheduler mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub owner_id: OwnerId,
    pub kind: JobKind,
    pub url: String,
    pub status: JobStatus,
    /// 1-based rank among queued jobs; `None` once dispatched.
    pub position: Option<usize>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
    pub tags: JobTags,
}

impl Job {
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id.clone(),
            kind: self.kind,
            url: self.url.clone(),
            status: self.status,
            position: self.position,
            message: self.message.clone(),
            created_at: self.created_at.to_rfc3339(),
            started_at: self.started_at.map(|t| t.to_rfc3339()),
            completed_at: self.completed_at.map(|t| t.to_rfc3339()),
            error: self.error.clone(),
            result: self.result.clone(),
        }
    }
}

/// Wire representation of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub url: String,
    pub status: JobStatus,
    pub position: Option<usize>,
    pub message: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_length: usize,
    pub processing_count: usize,
    pub max_concurrent: usize,
    pub completed_count: u64,
    pub failed_count: u64,
}

/// How a wait for a job to start ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Processing,
    /// The job reached a terminal state before it was observed processing.
    Finished(JobStatus),
    /// Unknown id, or evicted from history.
    NotFound,
    TimedOut,
}

/// Requests rejected before a job is created.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Invalid download type: {0}")]
    InvalidKind(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("Job not found")]
    NotFound,

    #[error("Job belongs to another user")]
    Forbidden,
}

/// Source URLs must be non-empty http(s) URLs.
pub fn validate_url(url: &str) -> Result<(), AdmissionError> {
    let trimmed = url.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));
    match rest {
        Some(rest) if !rest.is_empty() && !rest.contains(char::is_whitespace) => Ok(()),
        _ => Err(AdmissionError::InvalidUrl(url.to_string())),
    }
}
