//! Filesystem layout for ingestion: scratch directories, the permanent
//! content-addressed audio tree and the cover art tree.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tokio::fs;
use tracing::warn;
use walkdir::WalkDir;

use crate::library::TrackId;

#[derive(Debug, Error)]
pub enum FileHandlerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
}

/// Audio extensions accepted from acquisition backends and uploads.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "ogg", "wav"];

/// Characters that cannot appear in a file name on common filesystems.
const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Number of hash characters prefixed to stored file names.
const HASH_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone)]
pub struct FileHandler {
    library_dir: PathBuf,
    temp_dir: PathBuf,
}

impl FileHandler {
    pub fn new(library_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }

    /// Create the directory tree used by ingestion.
    pub async fn init(&self) -> Result<(), FileHandlerError> {
        fs::create_dir_all(self.music_dir()).await?;
        fs::create_dir_all(self.covers_dir()).await?;
        fs::create_dir_all(&self.temp_dir).await?;
        Ok(())
    }

    pub fn music_dir(&self) -> PathBuf {
        self.library_dir.join("music")
    }

    pub fn covers_dir(&self) -> PathBuf {
        self.library_dir.join("covers")
    }

    /// A fresh scratch directory under the temp root. It is deleted when the
    /// returned value is dropped.
    pub fn create_scratch_dir(&self, prefix: &str) -> Result<TempDir, FileHandlerError> {
        std::fs::create_dir_all(&self.temp_dir)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", sanitize_title(prefix)))
            .tempdir_in(&self.temp_dir)?;
        Ok(dir)
    }

    /// Permanent location of an audio file: `{hash[..12]}_{title}.{ext}`.
    pub fn music_path(&self, content_hash: &str, title: &str, extension: &str) -> PathBuf {
        self.music_dir()
            .join(library_file_name(content_hash, title, extension))
    }

    /// Claim a library path for new content by creating it empty. Two
    /// writers of the same content never get the same path; later claims get
    /// a numeric suffix.
    pub async fn reserve_music_path(
        &self,
        content_hash: &str,
        title: &str,
        extension: &str,
    ) -> Result<PathBuf, FileHandlerError> {
        fs::create_dir_all(self.music_dir()).await?;
        let mut candidate = self.music_path(content_hash, title, extension);
        let mut suffix = 1;
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(_) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let name = format!("{}_{}", sanitize_title(title), suffix);
                    candidate = self.music_path(content_hash, &name, extension);
                    suffix += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn cover_path(&self, track_id: TrackId) -> PathBuf {
        self.covers_dir().join(format!("cover_{}.jpg", track_id))
    }

    /// Move a file into the library, falling back to copy + delete when the
    /// scratch dir lives on another filesystem.
    pub async fn move_into_library(&self, from: &Path, to: &Path) -> Result<(), FileHandlerError> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        if fs::rename(from, to).await.is_err() {
            fs::copy(from, to).await?;
            fs::remove_file(from).await?;
        }
        Ok(())
    }
}

pub fn is_supported_audio(filename: &str) -> bool {
    extension_of(Path::new(filename))
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// The lowercased extension of `filename`, or an error if it is not audio
/// we accept.
pub fn supported_extension(filename: &str) -> Result<String, FileHandlerError> {
    match extension_of(Path::new(filename)) {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        Some(ext) => Err(FileHandlerError::UnsupportedFileType(ext)),
        None => Err(FileHandlerError::UnsupportedFileType(filename.to_string())),
    }
}

/// Lowercased extension of a path, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Supported audio files below `dir`, sorted by path.
pub fn list_audio_files(dir: &Path) -> Result<Vec<PathBuf>, FileHandlerError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            FileHandlerError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory loop")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_supported_audio(name) {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

/// Strip characters that are illegal in file names, then trim surrounding
/// spaces and dots. Never returns an empty string.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !ILLEGAL_FILENAME_CHARS.contains(c) && !c.is_control())
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == ' ' || c == '.');
    if trimmed.is_empty() {
        "track".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn library_file_name(content_hash: &str, title: &str, extension: &str) -> String {
    let prefix: String = content_hash.chars().take(HASH_PREFIX_LEN).collect();
    format!("{}_{}.{}", prefix, sanitize_title(title), extension)
}

/// Rollback guard for the files written while ingesting one file.
///
/// Unless [`commit`] is called, dropping the guard deletes them. The track
/// row needs no rollback: it is written in one transaction together with
/// the quota charge, right before the guard is committed.
///
/// [`commit`]: InFlightIngestion::commit
#[derive(Debug, Default)]
pub struct InFlightIngestion {
    files: Vec<PathBuf>,
    committed: bool,
}

impl InFlightIngestion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_file(&mut self, path: PathBuf) {
        self.files.push(path);
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for InFlightIngestion {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in &self.files {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {:?} during rollback: {}", path, e);
                }
            }
        }
    }
}
