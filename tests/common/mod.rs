//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestClient, TestServer, TestServerOptions};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_queue_info() {
//!     let server = TestServer::spawn(TestServerOptions::default()).await;
//!     let client = TestClient::for_owner(server.base_url.clone(), 1);
//!
//!     let response = client.queue_info().await;
//!     assert_eq!(response.status(), StatusCode::OK);
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
pub use client::TestClient;
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{fake_audio, ScriptedBackend};
pub use server::{TestServer, TestServerOptions};
