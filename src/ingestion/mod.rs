//! File ingestion for acquired and uploaded audio.
//!
//! Every file goes through the same steps:
//! 1. Content hash, and deduplication against the library
//! 2. Storage quota pre-check
//! 3. Metadata probe (tags, duration, bitrate)
//! 4. Track row, move into the content-addressed music tree
//! 5. Artist/album resolution, cover art, tags, playlist and likes
//! 6. Atomic storage charge, or rollback

mod file_handler;
mod hasher;
mod models;
mod pipeline;
mod probe;
#[cfg(test)]
pub(crate) mod testing;

pub use file_handler::{
    is_supported_audio, library_file_name, list_audio_files, sanitize_title, FileHandler,
    FileHandlerError, InFlightIngestion, SUPPORTED_EXTENSIONS,
};
pub use hasher::{bytes_to_mb, hash_bytes, hash_file, hash_file_async};
pub use models::*;
pub use pipeline::IngestionPipeline;
pub use probe::{parse_ffprobe_output, AudioInspector, FfprobeInspector, ProbeError, TrackMetadata};
