//! Library models for the SQLite-backed store.

use serde::{Deserialize, Serialize};

pub type OwnerId = i64;
pub type TrackId = i64;
pub type ArtistId = i64;
pub type AlbumId = i64;
pub type PlaylistId = i64;
pub type TagId = i64;

// =============================================================================
// Name normalization
// =============================================================================

/// Trims a catalog name, returning `None` when nothing is left.
pub fn clean_name(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Key used for case-insensitive artist/album matching.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// =============================================================================
// Catalog entities
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub content_hash: String,
    pub audio_path: String,
    pub cover_path: Option<String>,
    pub file_size_mb: f64,
    pub bitrate_kbps: Option<i64>,
    pub format: String,
    pub duration_secs: Option<i64>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub uploaded_by: OwnerId,
    pub album_id: Option<AlbumId>,
    pub created_at: i64,
}

/// Fields needed to persist a freshly ingested file.
#[derive(Clone, Debug)]
pub struct NewTrack {
    pub title: String,
    pub content_hash: String,
    pub audio_path: String,
    pub file_size_mb: f64,
    pub bitrate_kbps: Option<i64>,
    pub format: String,
    pub duration_secs: Option<i64>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub uploaded_by: OwnerId,
}

/// Result of inserting a track keyed by its content hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackInsert {
    Inserted(TrackId),
    /// Another row already holds the same content hash.
    DuplicateHash(TrackId),
    /// The uploader's quota had no room left; nothing was written.
    OverQuota,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: ArtistId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: AlbumId,
    pub name: String,
    pub release_year: Option<i32>,
    pub genre: Option<String>,
}

/// Outcome of a get-or-create lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolved<T> {
    pub id: T,
    pub created: bool,
}

// =============================================================================
// Owner collections
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: PlaylistId,
    pub owner_id: OwnerId,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub track_id: TrackId,
    pub position: i64,
    pub added_by: Option<OwnerId>,
}

/// Kinds of entries an owner can save to their library.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryItemType {
    Album,
    Artist,
    Playlist,
}

impl LibraryItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryItemType::Album => "album",
            LibraryItemType::Artist => "artist",
            LibraryItemType::Playlist => "playlist",
        }
    }
}

// =============================================================================
// Storage ledger
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub used_mb: f64,
    pub quota_mb: f64,
}

impl StorageUsage {
    pub fn would_exceed(&self, delta_mb: f64) -> bool {
        self.used_mb + delta_mb > self.quota_mb
    }

    pub fn remaining_mb(&self) -> f64 {
        (self.quota_mb - self.used_mb).max(0.0)
    }
}
