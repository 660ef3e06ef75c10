pub mod config;
pub mod download_routes;
mod http_layers;
pub mod owner;
pub mod server;
pub mod state;
pub mod upload_routes;

pub use config::ServerConfig;
pub use http_layers::*;
pub use owner::{Owner, HEADER_OWNER_ID_KEY};
pub use server::{make_app, run_server};
