//! Library storage and persistence.
//!
//! SQLite-backed storage for tracks, the artist/album catalog, owner
//! collections (playlists, likes, saved items, tags) and the storage ledger.

use super::models::*;
use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const CHARGE_WITHIN_QUOTA_SQL: &str = "UPDATE owners SET storage_used_mb = storage_used_mb + ?1
     WHERE id = ?2 AND storage_used_mb + ?1 <= storage_quota_mb";

const LINK_TRACK_ARTIST_SQL: &str = "INSERT OR IGNORE INTO track_artists (track_id, artist_id, artist_order)
     VALUES (?1, ?2, ?3)";

/// Insert a track row, returning `None` when the content hash is taken.
fn insert_track_row(conn: &Connection, track: &NewTrack) -> rusqlite::Result<Option<TrackId>> {
    let inserted = conn.execute(
        r#"
        INSERT INTO tracks (
            title, content_hash, audio_path, file_size_mb, bitrate_kbps,
            format, duration_secs, year, genre, uploaded_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(content_hash) DO NOTHING
        "#,
        params![
            track.title,
            track.content_hash,
            track.audio_path,
            track.file_size_mb,
            track.bitrate_kbps,
            track.format,
            track.duration_secs,
            track.year,
            track.genre,
            track.uploaded_by,
        ],
    )?;
    Ok((inserted == 1).then(|| conn.last_insert_rowid()))
}

fn track_id_by_hash(conn: &Connection, content_hash: &str) -> rusqlite::Result<TrackId> {
    conn.query_row(
        "SELECT id FROM tracks WHERE content_hash = ?1",
        params![content_hash],
        |row| row.get(0),
    )
}

/// Trait for library storage operations.
///
/// Every method is a short synchronous transaction; callers running on the
/// async runtime are expected to tolerate the brief blocking.
pub trait LibraryStore: Send + Sync {
    // === Owners & storage ledger ===

    /// Create the owner row with the given quota if it does not exist yet.
    fn ensure_owner(&self, owner_id: OwnerId, quota_mb: f64) -> Result<()>;

    fn get_storage_usage(&self, owner_id: OwnerId) -> Result<Option<StorageUsage>>;

    /// Unconditionally add `delta_mb` to the owner's used storage.
    fn add_storage_used(&self, owner_id: OwnerId, delta_mb: f64) -> Result<()>;

    /// Add `delta_mb` only if the result stays within quota.
    /// Returns false (and changes nothing) otherwise.
    fn add_storage_used_within_quota(&self, owner_id: OwnerId, delta_mb: f64) -> Result<bool>;

    // === Tracks ===

    fn find_track_by_hash(&self, content_hash: &str) -> Result<Option<Track>>;

    fn get_track(&self, id: TrackId) -> Result<Option<Track>>;

    /// Insert a track unless its content hash is already present.
    fn insert_track(&self, track: &NewTrack) -> Result<TrackInsert>;

    /// Insert a track, link it to its album and artists and charge its size
    /// to the uploader, all in one transaction. On `DuplicateHash` or
    /// `OverQuota` nothing is written, so a track row is only ever visible
    /// once it is final.
    fn insert_track_charged(
        &self,
        track: &NewTrack,
        album_id: Option<AlbumId>,
        artist_ids: &[ArtistId],
    ) -> Result<TrackInsert>;

    fn set_track_album(&self, track_id: TrackId, album_id: AlbumId) -> Result<()>;

    fn set_track_cover(&self, track_id: TrackId, cover_path: &str) -> Result<()>;

    fn get_tracks_count(&self) -> Result<usize>;

    // === Catalog ===

    fn find_artist_by_name(&self, name: &str) -> Result<Option<Artist>>;

    fn get_or_create_artist(&self, name: &str) -> Result<Resolved<ArtistId>>;

    fn find_album_by_name(&self, name: &str) -> Result<Option<Album>>;

    fn get_or_create_album(
        &self,
        name: &str,
        release_year: Option<i32>,
        genre: Option<&str>,
    ) -> Result<Resolved<AlbumId>>;

    /// Returns true if a new link row was written.
    fn link_album_artist(&self, album_id: AlbumId, artist_id: ArtistId, order: i64)
        -> Result<bool>;

    /// Returns true if a new link row was written.
    fn link_track_artist(&self, track_id: TrackId, artist_id: ArtistId, order: i64)
        -> Result<bool>;

    fn get_track_artists(&self, track_id: TrackId) -> Result<Vec<Artist>>;

    fn get_album_artists(&self, album_id: AlbumId) -> Result<Vec<Artist>>;

    fn get_artists_count(&self) -> Result<usize>;

    fn get_albums_count(&self) -> Result<usize>;

    // === Owner collections ===

    fn get_playlists_count(&self) -> Result<usize>;

    fn create_playlist(
        &self,
        owner_id: OwnerId,
        name: &str,
        description: Option<&str>,
    ) -> Result<Playlist>;

    fn append_playlist_track(
        &self,
        playlist_id: PlaylistId,
        track_id: TrackId,
        position: i64,
        added_by: OwnerId,
    ) -> Result<()>;

    fn get_playlist_tracks(&self, playlist_id: PlaylistId) -> Result<Vec<PlaylistEntry>>;

    /// Returns true if the track was not liked before.
    fn like_track(&self, owner_id: OwnerId, track_id: TrackId) -> Result<bool>;

    fn is_track_liked(&self, owner_id: OwnerId, track_id: TrackId) -> Result<bool>;

    /// Returns true if the item was not saved before.
    fn save_library_item(
        &self,
        owner_id: OwnerId,
        item_type: LibraryItemType,
        item_id: i64,
    ) -> Result<bool>;

    // === Tags ===

    fn create_tag(&self, owner_id: OwnerId, name: &str) -> Result<TagId>;

    fn create_global_tag(&self, name: &str) -> Result<TagId>;

    /// Apply a personal tag. Returns false when the tag does not belong to
    /// the owner or the track already carries it.
    fn apply_tag(&self, owner_id: OwnerId, track_id: TrackId, tag_id: TagId) -> Result<bool>;

    /// Apply a global tag. Returns false when the tag does not exist or the
    /// track already carries it.
    fn apply_global_tag(
        &self,
        track_id: TrackId,
        global_tag_id: TagId,
        added_by: OwnerId,
    ) -> Result<bool>;

    fn get_track_tag_ids(&self, owner_id: OwnerId, track_id: TrackId) -> Result<Vec<TagId>>;

    fn get_track_global_tag_ids(&self, track_id: TrackId) -> Result<Vec<TagId>>;
}

/// SQLite implementation of [`LibraryStore`].
pub struct SqliteLibraryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLibraryStore {
    /// Opens an existing library database or creates a new one.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(&db_path, LIBRARY_VERSIONED_SCHEMAS, "library")?;
        let store = SqliteLibraryStore {
            conn: Arc::new(Mutex::new(conn)),
        };
        info!(
            "Opened library database at {:?}: {} tracks, {} artists, {} albums",
            db_path.as_ref(),
            store.get_tracks_count()?,
            store.get_artists_count()?,
            store.get_albums_count()?
        );
        Ok(store)
    }

    /// Create an in-memory store, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        LIBRARY_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(SqliteLibraryStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_track(row: &rusqlite::Row) -> rusqlite::Result<Track> {
        Ok(Track {
            id: row.get("id")?,
            title: row.get("title")?,
            content_hash: row.get("content_hash")?,
            audio_path: row.get("audio_path")?,
            cover_path: row.get("cover_path")?,
            file_size_mb: row.get("file_size_mb")?,
            bitrate_kbps: row.get("bitrate_kbps")?,
            format: row.get("format")?,
            duration_secs: row.get("duration_secs")?,
            year: row.get("year")?,
            genre: row.get("genre")?,
            uploaded_by: row.get("uploaded_by")?,
            album_id: row.get("album_id")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_album(row: &rusqlite::Row) -> rusqlite::Result<Album> {
        Ok(Album {
            id: row.get("id")?,
            name: row.get("name")?,
            release_year: row.get("release_year")?,
            genre: row.get("genre")?,
        })
    }

    fn count(&self, table: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
            r.get(0)
        })?;
        Ok(count as usize)
    }
}

impl LibraryStore for SqliteLibraryStore {
    // =========================================================================
    // Owners & storage ledger
    // =========================================================================

    fn ensure_owner(&self, owner_id: OwnerId, quota_mb: f64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO owners (id, storage_quota_mb) VALUES (?1, ?2)",
            params![owner_id, quota_mb],
        )?;
        Ok(())
    }

    fn get_storage_usage(&self, owner_id: OwnerId) -> Result<Option<StorageUsage>> {
        let conn = self.conn.lock().unwrap();
        let usage = conn
            .query_row(
                "SELECT storage_used_mb, storage_quota_mb FROM owners WHERE id = ?1",
                params![owner_id],
                |row| {
                    Ok(StorageUsage {
                        used_mb: row.get(0)?,
                        quota_mb: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(usage)
    }

    fn add_storage_used(&self, owner_id: OwnerId, delta_mb: f64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE owners SET storage_used_mb = storage_used_mb + ?1 WHERE id = ?2",
            params![delta_mb, owner_id],
        )?;
        if updated == 0 {
            anyhow::bail!("Owner {} not found", owner_id);
        }
        Ok(())
    }

    fn add_storage_used_within_quota(&self, owner_id: OwnerId, delta_mb: f64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(CHARGE_WITHIN_QUOTA_SQL, params![delta_mb, owner_id])?;
        Ok(updated == 1)
    }

    // =========================================================================
    // Tracks
    // =========================================================================

    fn find_track_by_hash(&self, content_hash: &str) -> Result<Option<Track>> {
        let conn = self.conn.lock().unwrap();
        let track = conn
            .query_row(
                "SELECT * FROM tracks WHERE content_hash = ?1",
                params![content_hash],
                Self::row_to_track,
            )
            .optional()?;
        Ok(track)
    }

    fn get_track(&self, id: TrackId) -> Result<Option<Track>> {
        let conn = self.conn.lock().unwrap();
        let track = conn
            .query_row(
                "SELECT * FROM tracks WHERE id = ?1",
                params![id],
                Self::row_to_track,
            )
            .optional()?;
        Ok(track)
    }

    fn insert_track(&self, track: &NewTrack) -> Result<TrackInsert> {
        let conn = self.conn.lock().unwrap();
        match insert_track_row(&conn, track)? {
            Some(id) => Ok(TrackInsert::Inserted(id)),
            None => Ok(TrackInsert::DuplicateHash(track_id_by_hash(
                &conn,
                &track.content_hash,
            )?)),
        }
    }

    fn insert_track_charged(
        &self,
        track: &NewTrack,
        album_id: Option<AlbumId>,
        artist_ids: &[ArtistId],
    ) -> Result<TrackInsert> {
        let mut conn = self.conn.lock().unwrap();
        // Dropping the transaction without commit rolls it back
        let tx = conn.transaction()?;

        let Some(track_id) = insert_track_row(&tx, track)? else {
            let existing = track_id_by_hash(&tx, &track.content_hash)?;
            return Ok(TrackInsert::DuplicateHash(existing));
        };
        if let Some(album_id) = album_id {
            tx.execute(
                "UPDATE tracks SET album_id = ?1 WHERE id = ?2",
                params![album_id, track_id],
            )?;
        }
        for (order, artist_id) in artist_ids.iter().enumerate() {
            tx.execute(
                LINK_TRACK_ARTIST_SQL,
                params![track_id, artist_id, order as i64],
            )?;
        }

        let charged = tx.execute(
            CHARGE_WITHIN_QUOTA_SQL,
            params![track.file_size_mb, track.uploaded_by],
        )?;
        if charged == 0 {
            return Ok(TrackInsert::OverQuota);
        }

        tx.commit()?;
        Ok(TrackInsert::Inserted(track_id))
    }

    fn set_track_album(&self, track_id: TrackId, album_id: AlbumId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tracks SET album_id = ?1 WHERE id = ?2",
            params![album_id, track_id],
        )?;
        Ok(())
    }

    fn set_track_cover(&self, track_id: TrackId, cover_path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tracks SET cover_path = ?1 WHERE id = ?2",
            params![cover_path, track_id],
        )?;
        Ok(())
    }

    fn get_tracks_count(&self) -> Result<usize> {
        self.count("tracks")
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    fn find_artist_by_name(&self, name: &str) -> Result<Option<Artist>> {
        let conn = self.conn.lock().unwrap();
        let artist = conn
            .query_row(
                "SELECT id, name FROM artists WHERE name_key = ?1",
                params![name_key(name)],
                |row| {
                    Ok(Artist {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(artist)
    }

    fn get_or_create_artist(&self, name: &str) -> Result<Resolved<ArtistId>> {
        let conn = self.conn.lock().unwrap();
        let key = name_key(name);
        let created = conn.execute(
            "INSERT INTO artists (name, name_key) VALUES (?1, ?2)
             ON CONFLICT(name_key) DO NOTHING",
            params![name.trim(), key],
        )? == 1;
        let id = conn.query_row(
            "SELECT id FROM artists WHERE name_key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(Resolved { id, created })
    }

    fn find_album_by_name(&self, name: &str) -> Result<Option<Album>> {
        let conn = self.conn.lock().unwrap();
        let album = conn
            .query_row(
                "SELECT id, name, release_year, genre FROM albums WHERE name_key = ?1",
                params![name_key(name)],
                Self::row_to_album,
            )
            .optional()?;
        Ok(album)
    }

    fn get_or_create_album(
        &self,
        name: &str,
        release_year: Option<i32>,
        genre: Option<&str>,
    ) -> Result<Resolved<AlbumId>> {
        let conn = self.conn.lock().unwrap();
        let key = name_key(name);
        let created = conn.execute(
            "INSERT INTO albums (name, name_key, release_year, genre) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name_key) DO NOTHING",
            params![name.trim(), key, release_year, genre],
        )? == 1;
        let id = conn.query_row(
            "SELECT id FROM albums WHERE name_key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(Resolved { id, created })
    }

    fn link_album_artist(
        &self,
        album_id: AlbumId,
        artist_id: ArtistId,
        order: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO album_artists (album_id, artist_id, artist_order)
             VALUES (?1, ?2, ?3)",
            params![album_id, artist_id, order],
        )?;
        Ok(inserted == 1)
    }

    fn link_track_artist(
        &self,
        track_id: TrackId,
        artist_id: ArtistId,
        order: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(LINK_TRACK_ARTIST_SQL, params![track_id, artist_id, order])?;
        Ok(inserted == 1)
    }

    fn get_track_artists(&self, track_id: TrackId) -> Result<Vec<Artist>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT a.id, a.name FROM artists a
             JOIN track_artists ta ON ta.artist_id = a.id
             WHERE ta.track_id = ?1 ORDER BY ta.artist_order",
        )?;
        let artists = stmt
            .query_map(params![track_id], |row| {
                Ok(Artist {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(artists)
    }

    fn get_album_artists(&self, album_id: AlbumId) -> Result<Vec<Artist>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT a.id, a.name FROM artists a
             JOIN album_artists aa ON aa.artist_id = a.id
             WHERE aa.album_id = ?1 ORDER BY aa.artist_order",
        )?;
        let artists = stmt
            .query_map(params![album_id], |row| {
                Ok(Artist {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(artists)
    }

    fn get_artists_count(&self) -> Result<usize> {
        self.count("artists")
    }

    fn get_albums_count(&self) -> Result<usize> {
        self.count("albums")
    }

    fn get_playlists_count(&self) -> Result<usize> {
        self.count("playlists")
    }

    // =========================================================================
    // Owner collections
    // =========================================================================

    fn create_playlist(
        &self,
        owner_id: OwnerId,
        name: &str,
        description: Option<&str>,
    ) -> Result<Playlist> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO playlists (owner_id, name, description) VALUES (?1, ?2, ?3)",
            params![owner_id, name, description],
        )?;
        Ok(Playlist {
            id: conn.last_insert_rowid(),
            owner_id,
            name: name.to_string(),
            description: description.map(str::to_string),
        })
    }

    fn append_playlist_track(
        &self,
        playlist_id: PlaylistId,
        track_id: TrackId,
        position: i64,
        added_by: OwnerId,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO playlist_tracks (playlist_id, track_id, position, added_by)
             VALUES (?1, ?2, ?3, ?4)",
            params![playlist_id, track_id, position, added_by],
        )?;
        Ok(())
    }

    fn get_playlist_tracks(&self, playlist_id: PlaylistId) -> Result<Vec<PlaylistEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT track_id, position, added_by FROM playlist_tracks
             WHERE playlist_id = ?1 ORDER BY position, id",
        )?;
        let entries = stmt
            .query_map(params![playlist_id], |row| {
                Ok(PlaylistEntry {
                    track_id: row.get(0)?,
                    position: row.get(1)?,
                    added_by: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn like_track(&self, owner_id: OwnerId, track_id: TrackId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO liked_tracks (owner_id, track_id) VALUES (?1, ?2)",
            params![owner_id, track_id],
        )?;
        Ok(inserted == 1)
    }

    fn is_track_liked(&self, owner_id: OwnerId, track_id: TrackId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let liked = conn
            .query_row(
                "SELECT 1 FROM liked_tracks WHERE owner_id = ?1 AND track_id = ?2",
                params![owner_id, track_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(liked)
    }

    fn save_library_item(
        &self,
        owner_id: OwnerId,
        item_type: LibraryItemType,
        item_id: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO library_items (owner_id, item_type, item_id)
             VALUES (?1, ?2, ?3)",
            params![owner_id, item_type.as_str(), item_id],
        )?;
        Ok(inserted == 1)
    }

    // =========================================================================
    // Tags
    // =========================================================================

    fn create_tag(&self, owner_id: OwnerId, name: &str) -> Result<TagId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tags (owner_id, name) VALUES (?1, ?2)",
            params![owner_id, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn create_global_tag(&self, name: &str) -> Result<TagId> {
        let conn = self.conn.lock().unwrap();
        conn.execute("INSERT INTO global_tags (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    fn apply_tag(&self, owner_id: OwnerId, track_id: TrackId, tag_id: TagId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO track_tags (owner_id, track_id, tag_id)
             SELECT ?1, ?2, id FROM tags WHERE id = ?3 AND owner_id = ?1",
            params![owner_id, track_id, tag_id],
        )?;
        Ok(inserted == 1)
    }

    fn apply_global_tag(
        &self,
        track_id: TrackId,
        global_tag_id: TagId,
        added_by: OwnerId,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO global_track_tags (track_id, global_tag_id, added_by)
             SELECT ?1, id, ?3 FROM global_tags WHERE id = ?2",
            params![track_id, global_tag_id, added_by],
        )?;
        Ok(inserted == 1)
    }

    fn get_track_tag_ids(&self, owner_id: OwnerId, track_id: TrackId) -> Result<Vec<TagId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT tag_id FROM track_tags WHERE owner_id = ?1 AND track_id = ?2 ORDER BY tag_id",
        )?;
        let ids = stmt
            .query_map(params![owner_id, track_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn get_track_global_tag_ids(&self, track_id: TrackId) -> Result<Vec<TagId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT global_tag_id FROM global_track_tags WHERE track_id = ?1 ORDER BY global_tag_id",
        )?;
        let ids = stmt
            .query_map(params![track_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}
