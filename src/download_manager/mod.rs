//! Download Manager module
//!
//! Admits download requests into a bounded in-memory job queue and runs each
//! job through an external downloader and the ingestion pipeline.

mod acquisition;
mod job_processor;
mod manager;
mod models;
mod scheduler;

pub use acquisition::{
    acquire, AcquiredFiles, AcquisitionBackend, AcquisitionError, AcquisitionSettings,
    CommandBackend, Invocation, DEFAULT_SPOTIFY_TIMEOUT, DEFAULT_YOUTUBE_TIMEOUT,
};
pub use job_processor::JobProcessor;
pub use manager::DownloadManager;
pub use models::*;
pub use scheduler::{
    JobScheduler, DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_CONCURRENT, DEFAULT_WAIT_TIMEOUT,
};
