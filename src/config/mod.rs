mod file_config;

pub use file_config::{DownloadsConfig, FileConfig};

use crate::download_manager::{
    AcquisitionSettings, DEFAULT_MAX_CONCURRENT, DEFAULT_SPOTIFY_TIMEOUT, DEFAULT_YOUTUBE_TIMEOUT,
};
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_QUOTA_MB: f64 = 30000.0;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub library_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub max_concurrent_downloads: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub library_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,

    // Feature configs (with defaults)
    pub downloads: DownloadSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified on the command line or in config file")
            })?;

        // Validate db_dir exists
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let library_dir = file
            .library_dir
            .map(PathBuf::from)
            .or_else(|| cli.library_dir.clone())
            .unwrap_or_else(|| db_dir.join("library"));
        let temp_dir = file
            .temp_dir
            .map(PathBuf::from)
            .or_else(|| cli.temp_dir.clone())
            .unwrap_or_else(|| db_dir.join("tmp"));

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        // Download settings - merge file config with defaults
        let dl_file = file.downloads.unwrap_or_default();
        let defaults = DownloadSettings::default();
        let max_concurrent = dl_file
            .max_concurrent
            .or(cli.max_concurrent_downloads)
            .unwrap_or(defaults.max_concurrent);
        if max_concurrent == 0 {
            bail!("max_concurrent downloads must be at least 1");
        }
        let default_quota_mb = dl_file.default_quota_mb.unwrap_or(defaults.default_quota_mb);
        if !(default_quota_mb >= 0.0) {
            bail!("default_quota_mb must be a non-negative number");
        }
        let downloads = DownloadSettings {
            max_concurrent,
            spotdl_bin: dl_file
                .spotdl_bin
                .map(PathBuf::from)
                .unwrap_or(defaults.spotdl_bin),
            ytdlp_bin: dl_file
                .ytdlp_bin
                .map(PathBuf::from)
                .unwrap_or(defaults.ytdlp_bin),
            spotify_timeout_sec: dl_file
                .spotify_timeout_sec
                .unwrap_or(defaults.spotify_timeout_sec),
            youtube_timeout_sec: dl_file
                .youtube_timeout_sec
                .unwrap_or(defaults.youtube_timeout_sec),
            default_quota_mb,
            ffprobe_bin: dl_file
                .ffprobe_bin
                .map(PathBuf::from)
                .unwrap_or(defaults.ffprobe_bin),
            ffmpeg_bin: dl_file
                .ffmpeg_bin
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_bin),
        };

        Ok(Self {
            db_dir,
            library_dir,
            temp_dir,
            port,
            logging_level,
            downloads,
        })
    }

    pub fn library_db_path(&self) -> PathBuf {
        self.db_dir.join("library.db")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    pub max_concurrent: usize,
    pub spotdl_bin: PathBuf,
    pub ytdlp_bin: PathBuf,
    pub spotify_timeout_sec: u64,
    pub youtube_timeout_sec: u64,
    pub default_quota_mb: f64,
    pub ffprobe_bin: PathBuf,
    pub ffmpeg_bin: PathBuf,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            spotdl_bin: PathBuf::from("spotdl"),
            ytdlp_bin: PathBuf::from("yt-dlp"),
            spotify_timeout_sec: DEFAULT_SPOTIFY_TIMEOUT.as_secs(),
            youtube_timeout_sec: DEFAULT_YOUTUBE_TIMEOUT.as_secs(),
            default_quota_mb: DEFAULT_QUOTA_MB,
            ffprobe_bin: PathBuf::from("ffprobe"),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
        }
    }
}

impl DownloadSettings {
    pub fn acquisition(&self) -> AcquisitionSettings {
        AcquisitionSettings {
            spotdl_bin: self.spotdl_bin.clone(),
            ytdlp_bin: self.ytdlp_bin.clone(),
            spotify_timeout: Duration::from_secs(self.spotify_timeout_sec),
            youtube_timeout: Duration::from_secs(self.youtube_timeout_sec),
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_temp_db_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("body"),
            Some(RequestsLoggingLevel::Body)
        ));
        // Case insensitive
        assert!(matches!(
            parse_logging_level("PATH"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            library_dir: Some(PathBuf::from("/music")),
            temp_dir: None,
            port: 3001,
            logging_level: RequestsLoggingLevel::Headers,
            max_concurrent_downloads: Some(4),
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.library_dir, PathBuf::from("/music"));
        assert_eq!(config.temp_dir, temp_dir.path().join("tmp"));
        assert_eq!(config.port, 3001);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Headers);
        assert_eq!(config.downloads.max_concurrent, 4);
        assert_eq!(config.library_db_path(), temp_dir.path().join("library.db"));
    }

    #[test]
    fn test_resolve_defaults() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.library_dir, temp_dir.path().join("library"));
        assert_eq!(config.downloads, DownloadSettings::default());
        assert_eq!(config.downloads.max_concurrent, 3);
        assert_eq!(config.downloads.default_quota_mb, 30000.0);
        let acquisition = config.downloads.acquisition();
        assert_eq!(acquisition.spotify_timeout, Duration::from_secs(300));
        assert_eq!(acquisition.youtube_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/should/be/overridden")),
            library_dir: Some(PathBuf::from("/cli/library")),
            port: 3001,
            logging_level: RequestsLoggingLevel::Path,
            max_concurrent_downloads: Some(2),
            ..Default::default()
        };

        let file_config = FileConfig {
            db_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            library_dir: Some("/toml/library".to_string()),
            logging_level: Some("body".to_string()),
            downloads: Some(DownloadsConfig {
                max_concurrent: Some(6),
                spotdl_bin: Some("/opt/spotdl".to_string()),
                spotify_timeout_sec: Some(120),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.library_dir, PathBuf::from("/toml/library"));
        assert_eq!(config.logging_level, RequestsLoggingLevel::Body);
        assert_eq!(config.downloads.max_concurrent, 6);
        assert_eq!(config.downloads.spotdl_bin, PathBuf::from("/opt/spotdl"));
        assert_eq!(config.downloads.spotify_timeout_sec, 120);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.port, 3001);
        assert_eq!(config.downloads.youtube_timeout_sec, 600);
    }

    #[test]
    fn test_resolve_missing_db_dir_error() {
        let cli = CliConfig::default();
        let result = AppConfig::resolve(&cli, None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_dir must be specified"));
    }

    #[test]
    fn test_resolve_nonexistent_db_dir_error() {
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/nonexistent/path/that/should/not/exist")),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_db_dir_not_directory_error() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(temp_file.path().to_path_buf()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("not a directory"));
    }

    #[test]
    fn test_resolve_rejects_zero_slots() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            max_concurrent_downloads: Some(0),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("at least 1"));
    }
}
