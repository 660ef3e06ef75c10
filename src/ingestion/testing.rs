//! In-process stand-ins for ffprobe/ffmpeg used by unit tests.
//!
//! Test audio files are small text files of `key=value` lines. The keys
//! `title`, `artist`, `album`, `year`, `genre` and `cover` map onto
//! [`TrackMetadata`]; any other line only serves to make the content hash
//! unique.

use super::probe::{AudioInspector, ProbeError, TrackMetadata};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Build the content of a fake audio file.
pub fn fake_audio(pairs: &[(&str, &str)]) -> Vec<u8> {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}\n", k, v))
        .collect::<String>()
        .into_bytes()
}

#[derive(Debug, Default, Clone)]
pub struct KeyValueInspector;

#[async_trait]
impl AudioInspector for KeyValueInspector {
    async fn inspect(&self, path: &Path) -> Result<TrackMetadata, ProbeError> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut meta = TrackMetadata {
            format: path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_string),
            ..Default::default()
        };
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key {
                "title" => meta.title = Some(value.to_string()),
                "artist" => meta.artist = Some(value.to_string()),
                "album" => meta.album = Some(value.to_string()),
                "year" => meta.year = value.parse().ok(),
                "genre" => meta.genre = Some(value.to_string()),
                "cover" => meta.has_cover = value == "yes",
                "corrupt" => return Err(ProbeError::InvalidOutput(value.to_string())),
                _ => {}
            }
        }
        Ok(meta)
    }

    async fn extract_cover(&self, _audio: &Path, dest: &Path) -> Result<(), ProbeError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, b"jpeg").await?;
        Ok(())
    }
}

/// Parks the first caller until the test opens it, so tests can interleave
/// concurrent ingestions deterministically. Later callers pass straight
/// through.
pub struct Gate {
    used: AtomicBool,
    arrived: Semaphore,
    release: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            used: AtomicBool::new(false),
            arrived: Semaphore::new(0),
            release: Semaphore::new(0),
        })
    }

    async fn pass(&self) {
        if self.used.swap(true, Ordering::SeqCst) {
            return;
        }
        self.arrived.add_permits(1);
        self.release.acquire().await.unwrap().forget();
    }

    /// Resolves once a caller is parked at the gate.
    pub async fn wait_arrival(&self) {
        self.arrived.acquire().await.unwrap().forget();
    }

    pub fn open(&self) {
        self.release.add_permits(1);
    }
}

/// [`KeyValueInspector`] with an optional gate before metadata reads and
/// another before cover extraction.
#[derive(Default)]
pub struct GatedInspector {
    pub before_inspect: Option<Arc<Gate>>,
    pub before_cover: Option<Arc<Gate>>,
}

#[async_trait]
impl AudioInspector for GatedInspector {
    async fn inspect(&self, path: &Path) -> Result<TrackMetadata, ProbeError> {
        if let Some(gate) = &self.before_inspect {
            gate.pass().await;
        }
        KeyValueInspector.inspect(path).await
    }

    async fn extract_cover(&self, audio: &Path, dest: &Path) -> Result<(), ProbeError> {
        if let Some(gate) = &self.before_cover {
            gate.pass().await;
        }
        KeyValueInspector.extract_cover(audio, dest).await
    }
}
