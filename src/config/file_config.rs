use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub library_dir: Option<String>,
    pub temp_dir: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,

    // Feature configs
    pub downloads: Option<DownloadsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DownloadsConfig {
    pub max_concurrent: Option<usize>,
    pub spotdl_bin: Option<String>,
    pub ytdlp_bin: Option<String>,
    pub spotify_timeout_sec: Option<u64>,
    pub youtube_timeout_sec: Option<u64>,
    /// Quota given to owners the first time they show up.
    pub default_quota_mb: Option<f64>,
    pub ffprobe_bin: Option<String>,
    pub ffmpeg_bin: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
