//! Database schema for library.db.
//!
//! Holds the tracks, the artist/album catalog, owner collections and the
//! per-owner storage ledger.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const OWNER_FK: ForeignKey = ForeignKey {
    foreign_table: "owners",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const TRACK_FK: ForeignKey = ForeignKey {
    foreign_table: "tracks",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ALBUM_FK: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

// =============================================================================
// Owners & storage ledger
// =============================================================================

const OWNERS_TABLE_V0: Table = Table {
    name: "owners",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("storage_quota_mb", &SqlType::Real, non_null = true),
        sqlite_column!(
            "storage_used_mb",
            &SqlType::Real,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

// =============================================================================
// Catalog
// =============================================================================

const ARTISTS_TABLE_V0: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        // Lowercased name, the case-insensitive identity of the artist
        sqlite_column!("name_key", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[&["name_key"]],
};

const ALBUMS_TABLE_V0: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("name_key", &SqlType::Text, non_null = true),
        sqlite_column!("release_year", &SqlType::Integer),
        sqlite_column!("genre", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[&["name_key"]],
};

const TRACKS_TABLE_V0: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("content_hash", &SqlType::Text, non_null = true),
        sqlite_column!("audio_path", &SqlType::Text, non_null = true),
        sqlite_column!("cover_path", &SqlType::Text),
        sqlite_column!("file_size_mb", &SqlType::Real, non_null = true),
        sqlite_column!("bitrate_kbps", &SqlType::Integer),
        sqlite_column!("format", &SqlType::Text, non_null = true),
        sqlite_column!("duration_secs", &SqlType::Integer),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("genre", &SqlType::Text),
        sqlite_column!(
            "uploaded_by",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&OWNER_FK)
        ),
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            foreign_key = Some(&ForeignKey {
                foreign_table: "albums",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::SetNull,
            })
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_tracks_uploaded_by", "uploaded_by"),
        ("idx_tracks_album", "album_id"),
    ],
    unique_constraints: &[&["content_hash"]],
};

const ALBUM_ARTISTS_TABLE_V0: Table = Table {
    name: "album_artists",
    columns: &[
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_FK)
        ),
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("artist_order", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_album_artists_artist", "artist_id")],
    unique_constraints: &[&["album_id", "artist_id"]],
};

const TRACK_ARTISTS_TABLE_V0: Table = Table {
    name: "track_artists",
    columns: &[
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("artist_order", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_track_artists_artist", "artist_id")],
    unique_constraints: &[&["track_id", "artist_id"]],
};

// =============================================================================
// Owner collections
// =============================================================================

const PLAYLISTS_TABLE_V0: Table = Table {
    name: "playlists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "owner_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&OWNER_FK)
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_playlists_owner", "owner_id")],
    unique_constraints: &[],
};

const PLAYLIST_TRACKS_TABLE_V0: Table = Table {
    name: "playlist_tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "playlist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "playlists",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("added_by", &SqlType::Integer),
        sqlite_column!(
            "added_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_playlist_tracks_position", "playlist_id, position")],
    unique_constraints: &[],
};

const LIKED_TRACKS_TABLE_V0: Table = Table {
    name: "liked_tracks",
    columns: &[
        sqlite_column!(
            "owner_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&OWNER_FK)
        ),
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!(
            "liked_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[&["owner_id", "track_id"]],
};

const LIBRARY_ITEMS_TABLE_V0: Table = Table {
    name: "library_items",
    columns: &[
        sqlite_column!(
            "owner_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&OWNER_FK)
        ),
        sqlite_column!("item_type", &SqlType::Text, non_null = true),
        sqlite_column!("item_id", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "added_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[&["owner_id", "item_type", "item_id"]],
};

// =============================================================================
// Tags
// =============================================================================

const TAGS_TABLE_V0: Table = Table {
    name: "tags",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "owner_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&OWNER_FK)
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["owner_id", "name"]],
};

const TRACK_TAGS_TABLE_V0: Table = Table {
    name: "track_tags",
    columns: &[
        sqlite_column!(
            "owner_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&OWNER_FK)
        ),
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!(
            "tag_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "tags",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
    ],
    indices: &[("idx_track_tags_tag", "tag_id")],
    unique_constraints: &[&["owner_id", "track_id", "tag_id"]],
};

const GLOBAL_TAGS_TABLE_V0: Table = Table {
    name: "global_tags",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["name"]],
};

const GLOBAL_TRACK_TAGS_TABLE_V0: Table = Table {
    name: "global_track_tags",
    columns: &[
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!(
            "global_tag_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "global_tags",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("added_by", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[&["track_id", "global_tag_id"]],
};

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        OWNERS_TABLE_V0,
        ARTISTS_TABLE_V0,
        ALBUMS_TABLE_V0,
        TRACKS_TABLE_V0,
        ALBUM_ARTISTS_TABLE_V0,
        TRACK_ARTISTS_TABLE_V0,
        PLAYLISTS_TABLE_V0,
        PLAYLIST_TRACKS_TABLE_V0,
        LIKED_TRACKS_TABLE_V0,
        LIBRARY_ITEMS_TABLE_V0,
        TAGS_TABLE_V0,
        TRACK_TAGS_TABLE_V0,
        GLOBAL_TAGS_TABLE_V0,
        GLOBAL_TRACK_TAGS_TABLE_V0,
    ],
    migration: None,
}];
