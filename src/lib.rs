//! Music library acquisition server library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod download_manager;
pub mod ingestion;
pub mod library;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use download_manager::{DownloadManager, JobScheduler};
pub use ingestion::IngestionPipeline;
pub use library::{LibraryStore, SqliteLibraryStore, StorageAccountant};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
