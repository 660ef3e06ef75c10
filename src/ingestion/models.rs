//! Types shared by the ingestion pipeline and its callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::file_handler::FileHandlerError;
use super::probe::ProbeError;
use crate::library::{OwnerId, PlaylistId, TagId, TrackId};

pub const SKIP_REASON_DUPLICATE: &str = "Already in library";
pub const SKIP_REASON_QUOTA: &str = "Storage quota exceeded";

/// Where the files of an ingestion run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportSource {
    Spotify,
    Youtube,
    Upload,
}

impl ImportSource {
    /// Name of the playlist collecting a multi-track import.
    pub fn playlist_name(&self) -> &'static str {
        match self {
            ImportSource::Spotify => "Imported from Spotify",
            ImportSource::Youtube => "Imported from YouTube",
            ImportSource::Upload => "Uploaded",
        }
    }
}

/// What a source URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportShape {
    Track,
    Album,
    Playlist,
}

impl ImportShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportShape::Track => "track",
            ImportShape::Album => "album",
            ImportShape::Playlist => "playlist",
        }
    }
}

/// Per-run parameters threaded through every file of one job or upload.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    pub owner_id: OwnerId,
    pub source: ImportSource,
    pub shape: ImportShape,
    pub source_url: String,
    pub tag_id: Option<TagId>,
    pub global_tag_id: Option<TagId>,
}

impl IngestionContext {
    pub fn upload(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            source: ImportSource::Upload,
            shape: ImportShape::Track,
            source_url: String::new(),
            tag_id: None,
            global_tag_id: None,
        }
    }

    /// Playlist and album imports collect their tracks in a playlist.
    pub fn wants_playlist(&self) -> bool {
        self.source != ImportSource::Upload
            && matches!(self.shape, ImportShape::Playlist | ImportShape::Album)
    }

    /// Single-track downloads are liked on the owner's behalf.
    pub fn auto_likes(&self) -> bool {
        self.source != ImportSource::Upload && self.shape == ImportShape::Track
    }

    pub fn saves_album(&self) -> bool {
        self.source != ImportSource::Upload && self.shape == ImportShape::Album
    }

    pub fn report_type(&self) -> &'static str {
        match self.source {
            ImportSource::Upload => "upload",
            _ => self.shape.as_str(),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("'{title}' is already in the library (track {track_id})")]
    Duplicate { title: String, track_id: TrackId },

    #[error("Storage quota exceeded while ingesting '{title}'")]
    QuotaExceeded { title: String },

    #[error("Could not read audio metadata: {0}")]
    Metadata(#[from] ProbeError),

    #[error("Database error: {0}")]
    Persistence(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
}

impl From<FileHandlerError> for IngestionError {
    fn from(err: FileHandlerError) -> Self {
        match err {
            FileHandlerError::Io(e) => IngestionError::Io(e),
            FileHandlerError::UnsupportedFileType(ext) => IngestionError::UnsupportedFileType(ext),
        }
    }
}

impl IngestionError {
    /// Duplicates and quota refusals are reported as skips, not failures.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            IngestionError::Duplicate { .. } | IngestionError::QuotaExceeded { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedTrack {
    pub id: TrackId,
    pub title: String,
    pub file_size_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTrack {
    pub title: String,
    pub reason: String,
    pub id: Option<TrackId>,
}

impl SkippedTrack {
    pub fn duplicate(title: impl Into<String>, track_id: TrackId) -> Self {
        Self {
            title: title.into(),
            reason: SKIP_REASON_DUPLICATE.to_string(),
            id: Some(track_id),
        }
    }

    pub fn over_quota(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            reason: SKIP_REASON_QUOTA.to_string(),
            id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: PlaylistId,
    pub name: String,
    pub track_count: usize,
}

/// Result of ingesting a single file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Ingested(IngestedTrack),
    Skipped(SkippedTrack),
}

/// Summary of one ingestion run, stored as the job result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub message: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub processed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub tracks: Vec<IngestedTrack>,
    pub skipped_tracks: Vec<SkippedTrack>,
    pub errors: Vec<FailedFile>,
    pub playlist: Option<PlaylistSummary>,
    pub auto_liked: bool,
    pub album_saved: bool,
}

impl IngestionReport {
    pub fn new(ctx: &IngestionContext) -> Self {
        Self {
            message: "Download completed".to_string(),
            url: ctx.source_url.clone(),
            kind: ctx.report_type().to_string(),
            processed: 0,
            skipped: 0,
            errored: 0,
            tracks: Vec::new(),
            skipped_tracks: Vec::new(),
            errors: Vec::new(),
            playlist: None,
            auto_liked: false,
            album_saved: false,
        }
    }

    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Ingested(track) => {
                self.processed += 1;
                self.tracks.push(track);
            }
            FileOutcome::Skipped(skip) => {
                self.skipped += 1;
                self.skipped_tracks.push(skip);
            }
        }
    }

    pub fn record_error(&mut self, file: impl Into<String>, error: &IngestionError) {
        self.errored += 1;
        self.errors.push(FailedFile {
            file: file.into(),
            error: error.to_string(),
        });
    }
}
