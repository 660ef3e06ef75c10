//! Test doubles for the external tools
//!
//! Fake audio files are short `key=value` text files; [`KeyValueInspector`]
//! reads them back as tags, standing in for ffprobe. [`ScriptedBackend`]
//! stands in for spotdl/yt-dlp by writing canned files per URL.

#![allow(dead_code)]

use async_trait::async_trait;
use music_library_server::download_manager::{AcquisitionBackend, AcquisitionError, JobKind};
use music_library_server::ingestion::{AudioInspector, ProbeError, TrackMetadata};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub fn fake_audio(pairs: &[(&str, &str)]) -> Vec<u8> {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}\n", k, v))
        .collect::<String>()
        .into_bytes()
}

pub struct KeyValueInspector;

#[async_trait]
impl AudioInspector for KeyValueInspector {
    async fn inspect(&self, path: &Path) -> Result<TrackMetadata, ProbeError> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut meta = TrackMetadata::default();
        for (key, value) in content.lines().filter_map(|l| l.split_once('=')) {
            match key {
                "title" => meta.title = Some(value.to_string()),
                "artist" => meta.artist = Some(value.to_string()),
                "album" => meta.album = Some(value.to_string()),
                "year" => meta.year = value.parse().ok(),
                "corrupt" => return Err(ProbeError::InvalidOutput(value.to_string())),
                _ => {}
            }
        }
        Ok(meta)
    }

    async fn extract_cover(&self, _audio: &Path, _dest: &Path) -> Result<(), ProbeError> {
        Err(ProbeError::ExtractionFailed("no cover in test files".to_string()))
    }
}

/// Writes the files registered for a URL into the destination directory.
/// Unknown URLs produce nothing, which fails the job. With a gate, every
/// fetch first waits for a permit.
#[derive(Default)]
pub struct ScriptedBackend {
    files: HashMap<String, Vec<(String, Vec<u8>)>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(mut self, url: &str, files: Vec<(&str, Vec<u8>)>) -> Self {
        self.files.insert(
            url.to_string(),
            files
                .into_iter()
                .map(|(name, data)| (name.to_string(), data))
                .collect(),
        );
        self
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl AcquisitionBackend for ScriptedBackend {
    async fn fetch(&self, _kind: JobKind, url: &str, dest: &Path) -> Result<(), AcquisitionError> {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(files) = self.files.get(url) {
            for (name, data) in files {
                tokio::fs::write(dest.join(name), data).await?;
            }
        }
        Ok(())
    }
}
