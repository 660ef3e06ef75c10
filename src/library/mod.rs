//! Music library persistence.
//!
//! Tracks keyed by content hash, the artist/album catalog with
//! case-insensitive resolution, owner collections and the storage ledger.

mod accountant;
mod models;
mod resolver;
mod schema;
mod store;

pub use accountant::StorageAccountant;
pub use models::*;
pub use resolver::{CatalogResolver, TrackLinks};
pub use schema::LIBRARY_VERSIONED_SCHEMAS;
pub use store::{LibraryStore, SqliteLibraryStore};
