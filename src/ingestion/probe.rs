//! Audio metadata and cover art extraction using ffprobe/ffmpeg.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe failed: {0}")]
    ProbeFailed(String),

    #[error("ffmpeg failed: {0}")]
    ExtractionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid output: {0}")]
    InvalidOutput(String),
}

/// Everything the pipeline needs to know about an audio file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub duration_secs: Option<i64>,
    pub bitrate_kbps: Option<i64>,
    /// Container format name (e.g. "mp3", "flac").
    pub format: Option<String>,
    /// An attached picture stream is present.
    pub has_cover: bool,
}

/// Reads tags and artwork from audio files.
#[async_trait]
pub trait AudioInspector: Send + Sync {
    async fn inspect(&self, path: &Path) -> Result<TrackMetadata, ProbeError>;

    /// Write the embedded cover of `audio` to `dest` as JPEG.
    async fn extract_cover(&self, audio: &Path, dest: &Path) -> Result<(), ProbeError>;
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    bit_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    disposition: HashMap<String, i64>,
}

/// Production inspector shelling out to ffprobe and ffmpeg.
#[derive(Debug, Clone)]
pub struct FfprobeInspector {
    ffprobe_bin: PathBuf,
    ffmpeg_bin: PathBuf,
}

impl FfprobeInspector {
    pub fn new(ffprobe_bin: impl Into<PathBuf>, ffmpeg_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_bin: ffprobe_bin.into(),
            ffmpeg_bin: ffmpeg_bin.into(),
        }
    }
}

impl Default for FfprobeInspector {
    fn default() -> Self {
        Self::new("ffprobe", "ffmpeg")
    }
}

#[async_trait]
impl AudioInspector for FfprobeInspector {
    async fn inspect(&self, path: &Path) -> Result<TrackMetadata, ProbeError> {
        let output = Command::new(&self.ffprobe_bin)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::ProbeFailed(stderr.to_string()));
        }

        parse_ffprobe_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn extract_cover(&self, audio: &Path, dest: &Path) -> Result<(), ProbeError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let output = Command::new(&self.ffmpeg_bin)
            .arg("-i")
            .arg(audio)
            .args(["-an", "-map", "0:v:0", "-frames:v", "1", "-y"])
            .arg(dest)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::ExtractionFailed(stderr.to_string()));
        }
        Ok(())
    }
}

/// Parse the JSON printed by `ffprobe -show_format -show_streams`.
///
/// Tags are looked up case-insensitively, container tags first, then the
/// audio stream's (ogg and flac keep them on the stream).
pub fn parse_ffprobe_output(json: &str) -> Result<TrackMetadata, ProbeError> {
    let probe: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| ProbeError::InvalidOutput(format!("JSON parse error: {}", e)))?;

    let audio_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .ok_or_else(|| ProbeError::InvalidOutput("No audio stream found".to_string()))?;

    let tag = |key: &str| {
        find_tag(&probe.format.tags, key).or_else(|| find_tag(&audio_stream.tags, key))
    };

    let duration_secs = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .map(|d| d.round() as i64);

    // Prefer the stream bitrate, fall back to the container's
    let bitrate_kbps = audio_stream
        .bit_rate
        .as_deref()
        .or(probe.format.bit_rate.as_deref())
        .and_then(|b| b.parse::<i64>().ok())
        .map(|b| b / 1000);

    let has_cover = probe.streams.iter().any(|s| {
        s.codec_type.as_deref() == Some("video")
            || s.disposition.get("attached_pic").copied() == Some(1)
    });

    Ok(TrackMetadata {
        title: tag("title"),
        artist: tag("artist").or_else(|| tag("album_artist")),
        album: tag("album"),
        year: tag("date").or_else(|| tag("year")).and_then(|d| parse_year(&d)),
        genre: tag("genre"),
        duration_secs,
        bitrate_kbps,
        format: probe
            .format
            .format_name
            .map(|f| f.split(',').next().unwrap_or_default().to_string()),
        has_cover,
    })
}

fn find_tag(tags: &HashMap<String, String>, key: &str) -> Option<String> {
    tags.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The first four characters of a date tag, when they are digits.
pub fn parse_year(date: &str) -> Option<i32> {
    let prefix: String = date.trim().chars().take(4).collect();
    if prefix.len() == 4 && prefix.chars().all(|c| c.is_ascii_digit()) {
        prefix.parse().ok()
    } else {
        None
    }
}
