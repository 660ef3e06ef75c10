//! Acquisition of audio files through external downloader tools.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::models::JobKind;
use crate::ingestion::{list_audio_files, FileHandler, FileHandlerError};

pub const DEFAULT_SPOTIFY_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_YOUTUBE_TIMEOUT: Duration = Duration::from_secs(600);

/// Max stderr bytes kept in an error message.
const STDERR_EXCERPT_LEN: usize = 2000;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed ({status}): {stderr}")]
    NonZeroExit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{} timed out after {}s", .program, .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("No audio files were downloaded")]
    NoFiles,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FileHandlerError> for AcquisitionError {
    fn from(err: FileHandlerError) -> Self {
        match err {
            FileHandlerError::Io(e) => AcquisitionError::Io(e),
            other => AcquisitionError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// Fetches the audio behind a URL into a directory.
#[async_trait]
pub trait AcquisitionBackend: Send + Sync {
    async fn fetch(&self, kind: JobKind, url: &str, dest: &Path) -> Result<(), AcquisitionError>;
}

/// Binaries and time limits of the downloader tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionSettings {
    pub spotdl_bin: PathBuf,
    pub ytdlp_bin: PathBuf,
    pub spotify_timeout: Duration,
    pub youtube_timeout: Duration,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            spotdl_bin: PathBuf::from("spotdl"),
            ytdlp_bin: PathBuf::from("yt-dlp"),
            spotify_timeout: DEFAULT_SPOTIFY_TIMEOUT,
            youtube_timeout: DEFAULT_YOUTUBE_TIMEOUT,
        }
    }
}

/// A fully described tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub timeout: Duration,
}

impl AcquisitionSettings {
    pub fn invocation(&self, kind: JobKind, url: &str, dest: &Path) -> Invocation {
        match kind {
            JobKind::Spotify => Invocation {
                program: self.spotdl_bin.clone(),
                args: vec![url.into(), "--output".into(), dest.as_os_str().to_owned()],
                timeout: self.spotify_timeout,
            },
            JobKind::Youtube => {
                let template = dest.join("%(title)s.%(ext)s");
                Invocation {
                    program: self.ytdlp_bin.clone(),
                    args: vec![
                        "-x".into(),
                        "--audio-format".into(),
                        "mp3".into(),
                        "--audio-quality".into(),
                        "0".into(),
                        "-o".into(),
                        template.into_os_string(),
                        url.into(),
                    ],
                    timeout: self.youtube_timeout,
                }
            }
        }
    }
}

/// Runs spotdl / yt-dlp as child processes.
pub struct CommandBackend {
    settings: AcquisitionSettings,
}

impl CommandBackend {
    pub fn new(settings: AcquisitionSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl AcquisitionBackend for CommandBackend {
    async fn fetch(&self, kind: JobKind, url: &str, dest: &Path) -> Result<(), AcquisitionError> {
        let invocation = self.settings.invocation(kind, url, dest);
        let program = invocation.program.to_string_lossy().to_string();
        debug!("Running {} {:?}", program, invocation.args);

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        // Dropping the output future on timeout kills the child
        let output = match tokio::time::timeout(invocation.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(AcquisitionError::Spawn { program, source }),
            Err(_) => {
                warn!("{} timed out after {}s", program, invocation.timeout.as_secs());
                return Err(AcquisitionError::Timeout {
                    program,
                    timeout: invocation.timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcquisitionError::NonZeroExit {
                program,
                status: output.status,
                stderr: tail(&stderr, STDERR_EXCERPT_LEN),
            });
        }
        Ok(())
    }
}

fn tail(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.len() <= max {
        return s.to_string();
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}

/// Downloaded files together with the scratch directory holding them.
/// Dropping this removes the directory and anything left in it.
pub struct AcquiredFiles {
    dir: TempDir,
    pub files: Vec<PathBuf>,
}

impl AcquiredFiles {
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Fetch `url` into a fresh scratch dir and list the audio that arrived.
pub async fn acquire(
    backend: &dyn AcquisitionBackend,
    files: &FileHandler,
    job_id: &str,
    kind: JobKind,
    url: &str,
) -> Result<AcquiredFiles, AcquisitionError> {
    let dir = files.create_scratch_dir(job_id)?;
    backend.fetch(kind, url, dir.path()).await?;

    let audio = list_audio_files(dir.path())?;
    if audio.is_empty() {
        return Err(AcquisitionError::NoFiles);
    }
    info!("Job {} acquired {} audio file(s)", job_id, audio.len());
    Ok(AcquiredFiles { dir, files: audio })
}
