//! Shared values for end-to-end tests

#![allow(dead_code)]

pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
pub const JOB_FINISH_TIMEOUT_MS: u64 = 10_000;

pub const OWNER_ALICE: i64 = 1;
pub const OWNER_BOB: i64 = 2;

pub const DEFAULT_TEST_QUOTA_MB: f64 = 100.0;

pub const SPOTIFY_PLAYLIST_URL: &str = "https://open.spotify.com/playlist/37i9dQZF1DX";
pub const SPOTIFY_ALBUM_URL: &str = "https://open.spotify.com/album/4aawyAB9vmqN3";
pub const YOUTUBE_VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
