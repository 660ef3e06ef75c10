//! Idempotent artist/album resolution and track linking.

use super::models::*;
use super::store::LibraryStore;
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// Get-or-create lookups for catalog entities.
///
/// Names match case-insensitively. The store's unique `name_key` constraint
/// makes concurrent resolution of the same new name converge on one row.
#[derive(Clone)]
pub struct CatalogResolver {
    store: Arc<dyn LibraryStore>,
}

/// Catalog rows a track ended up linked to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackLinks {
    pub album_id: Option<AlbumId>,
    pub artist_ids: Vec<ArtistId>,
}

impl CatalogResolver {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }

    /// Blank names resolve to `None`.
    pub fn get_or_create_artist(&self, name: &str) -> Result<Option<ArtistId>> {
        let Some(name) = clean_name(name) else {
            return Ok(None);
        };
        let resolved = self.store.get_or_create_artist(name)?;
        if resolved.created {
            debug!("Created artist '{}' ({})", name, resolved.id);
        }
        Ok(Some(resolved.id))
    }

    /// Resolve an album by title. When the album is created by this call and
    /// a primary artist is given, that artist is linked to it.
    pub fn get_or_create_album(
        &self,
        title: &str,
        release_year: Option<i32>,
        genre: Option<&str>,
        primary_artist: Option<&str>,
    ) -> Result<Option<AlbumId>> {
        let Some(title) = clean_name(title) else {
            return Ok(None);
        };
        let resolved = self.store.get_or_create_album(title, release_year, genre)?;
        if resolved.created {
            debug!("Created album '{}' ({})", title, resolved.id);
            if let Some(artist_id) = primary_artist
                .map(|name| self.get_or_create_artist(name))
                .transpose()?
                .flatten()
            {
                self.store.link_album_artist(resolved.id, artist_id, 0)?;
            }
        }
        Ok(Some(resolved.id))
    }

    /// Attach a track to its album and artists. Re-linking is a no-op.
    pub fn link_track(
        &self,
        track_id: TrackId,
        album_id: Option<AlbumId>,
        artist_ids: &[ArtistId],
    ) -> Result<()> {
        if let Some(album_id) = album_id {
            self.store.set_track_album(track_id, album_id)?;
        }
        for (order, artist_id) in artist_ids.iter().enumerate() {
            self.store
                .link_track_artist(track_id, *artist_id, order as i64)?;
        }
        Ok(())
    }

    /// Resolve album and artist names from embedded tags. Nothing refers to
    /// a track yet; the caller links the rows when it stores one.
    pub fn resolve(
        &self,
        artist: Option<&str>,
        album: Option<&str>,
        year: Option<i32>,
        genre: Option<&str>,
    ) -> Result<TrackLinks> {
        let album_id = match album {
            Some(title) => self.get_or_create_album(title, year, genre, artist)?,
            None => None,
        };
        let artist_ids: Vec<ArtistId> = match artist {
            Some(name) => self.get_or_create_artist(name)?.into_iter().collect(),
            None => Vec::new(),
        };
        Ok(TrackLinks {
            album_id,
            artist_ids,
        })
    }
}
