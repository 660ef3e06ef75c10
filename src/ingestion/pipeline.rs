//! Per-file ingestion: deduplicate, meter, probe, store and link.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::file_handler::{
    extension_of, sanitize_title, supported_extension, FileHandler, InFlightIngestion,
};
use super::hasher::{bytes_to_mb, hash_file_async};
use super::models::*;
use super::probe::AudioInspector;
use crate::library::{
    AlbumId, CatalogResolver, LibraryItemType, LibraryStore, NewTrack, OwnerId, Playlist,
    StorageAccountant, TrackId, TrackInsert,
};

/// State carried across the files of one ingestion run.
struct ImportSession {
    playlist: Option<Playlist>,
    next_position: i64,
    auto_liked: bool,
    album_saved: bool,
}

impl ImportSession {
    fn new() -> Self {
        Self {
            playlist: None,
            next_position: 1,
            auto_liked: false,
            album_saved: false,
        }
    }

    fn playlist_summary(&self) -> Option<PlaylistSummary> {
        self.playlist.as_ref().map(|p| PlaylistSummary {
            id: p.id,
            name: p.name.clone(),
            track_count: (self.next_position - 1) as usize,
        })
    }
}

/// Turns acquired audio files into library tracks.
#[derive(Clone)]
pub struct IngestionPipeline {
    store: Arc<dyn LibraryStore>,
    resolver: CatalogResolver,
    accountant: StorageAccountant,
    files: FileHandler,
    inspector: Arc<dyn AudioInspector>,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn LibraryStore>,
        accountant: StorageAccountant,
        files: FileHandler,
        inspector: Arc<dyn AudioInspector>,
    ) -> Self {
        Self {
            resolver: CatalogResolver::new(store.clone()),
            store,
            accountant,
            files,
            inspector,
        }
    }

    pub fn file_handler(&self) -> &FileHandler {
        &self.files
    }

    pub fn accountant(&self) -> &StorageAccountant {
        &self.accountant
    }

    /// Ingest every file in order. Per-file problems end up in the report;
    /// only failures that make the whole run meaningless are returned as
    /// errors.
    pub async fn ingest_files(
        &self,
        ctx: &IngestionContext,
        files: &[PathBuf],
    ) -> Result<IngestionReport> {
        self.accountant.ensure_owner(ctx.owner_id)?;

        let mut session = ImportSession::new();
        let mut report = IngestionReport::new(ctx);

        for path in files {
            let label = display_name(path);
            match self.ingest_file(ctx, &mut session, path).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!("Failed to ingest {}: {}", label, e);
                    report.record_error(label, &e);
                }
            }
        }

        report.playlist = session.playlist_summary();
        report.auto_liked = session.auto_liked;
        report.album_saved = session.album_saved;

        info!(
            "Ingestion for owner {} finished: {} processed, {} skipped, {} errored",
            ctx.owner_id, report.processed, report.skipped, report.errored
        );
        Ok(report)
    }

    /// Ingest a single uploaded file. Skips are surfaced as errors so the
    /// caller can map them to a response status.
    pub async fn ingest_upload(
        &self,
        owner_id: OwnerId,
        filename: &str,
        data: &[u8],
    ) -> Result<IngestedTrack, IngestionError> {
        supported_extension(filename)?;
        self.accountant.ensure_owner(owner_id)?;

        let scratch = self
            .files
            .create_scratch_dir(&format!("upload_{}", owner_id))?;
        let base_name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(filename);
        let path = scratch.path().join(sanitize_title(base_name));
        tokio::fs::write(&path, data).await?;

        let ctx = IngestionContext::upload(owner_id);
        let mut session = ImportSession::new();
        match self.ingest_file(&ctx, &mut session, &path).await? {
            FileOutcome::Ingested(track) => Ok(track),
            FileOutcome::Skipped(skip) => match skip.id {
                Some(track_id) => Err(IngestionError::Duplicate {
                    title: skip.title,
                    track_id,
                }),
                None => Err(IngestionError::QuotaExceeded { title: skip.title }),
            },
        }
    }

    async fn ingest_file(
        &self,
        ctx: &IngestionContext,
        session: &mut ImportSession,
        path: &Path,
    ) -> Result<FileOutcome, IngestionError> {
        let stem = file_stem(path);
        let size_mb = bytes_to_mb(tokio::fs::metadata(path).await?.len());
        let content_hash = hash_file_async(path.to_path_buf()).await?;

        if let Some(existing) = self.store.find_track_by_hash(&content_hash)? {
            return self
                .record_duplicate(ctx, session, path, &stem, existing.id)
                .await;
        }

        if self.accountant.would_exceed(ctx.owner_id, size_mb)? {
            warn!(
                "Storage quota exceeded for owner {}, skipping '{}' ({:.2} MB)",
                ctx.owner_id, stem, size_mb
            );
            return Ok(FileOutcome::Skipped(SkippedTrack::over_quota(stem)));
        }

        let meta = self.inspector.inspect(path).await?;
        let title = meta.title.clone().unwrap_or_else(|| stem.clone());
        let extension = extension_of(path).unwrap_or_else(|| "mp3".to_string());
        let links = self.resolver.resolve(
            meta.artist.as_deref(),
            meta.album.as_deref(),
            meta.year,
            meta.genre.as_deref(),
        )?;

        let mut guard = InFlightIngestion::new();
        let dest = self
            .files
            .reserve_music_path(&content_hash, &title, &extension)
            .await?;
        guard.track_file(dest.clone());
        self.files.move_into_library(path, &dest).await?;

        let insert = self.store.insert_track_charged(
            &NewTrack {
                title: title.clone(),
                content_hash: content_hash.clone(),
                audio_path: dest.to_string_lossy().to_string(),
                file_size_mb: size_mb,
                bitrate_kbps: meta.bitrate_kbps,
                format: meta.format.clone().unwrap_or_else(|| extension.clone()),
                duration_secs: meta.duration_secs,
                year: meta.year,
                genre: meta.genre.clone(),
                uploaded_by: ctx.owner_id,
            },
            links.album_id,
            &links.artist_ids,
        )?;
        let track_id = match insert {
            TrackInsert::Inserted(id) => id,
            TrackInsert::DuplicateHash(existing) => {
                // Lost the race against a concurrent writer of the same content
                debug!("Track '{}' was inserted concurrently as {}", title, existing);
                drop(guard);
                return self
                    .record_duplicate(ctx, session, path, &stem, existing)
                    .await;
            }
            TrackInsert::OverQuota => {
                warn!(
                    "Storage quota exceeded for owner {} while storing '{}', rolling back",
                    ctx.owner_id, title
                );
                return Ok(FileOutcome::Skipped(SkippedTrack::over_quota(title)));
            }
        };
        guard.commit();
        info!(
            "Ingested '{}' as track {} ({:.2} MB) for owner {}",
            title, track_id, size_mb, ctx.owner_id
        );

        // The track is final; what follows only decorates it
        if meta.has_cover {
            self.attach_cover(track_id, &dest).await;
        }
        if let Err(e) = self.attach_to_owner(ctx, session, track_id, links.album_id) {
            error!(
                "Track {} stored but adding it to owner {}'s collection failed: {}",
                track_id, ctx.owner_id, e
            );
        }

        Ok(FileOutcome::Ingested(IngestedTrack {
            id: track_id,
            title,
            file_size_mb: size_mb,
        }))
    }

    async fn attach_cover(&self, track_id: TrackId, audio: &Path) {
        let cover = self.files.cover_path(track_id);
        let stored = match self.inspector.extract_cover(audio, &cover).await {
            Ok(()) => self
                .store
                .set_track_cover(track_id, &cover.to_string_lossy())
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = stored {
            warn!("Failed to extract cover art for track {}: {}", track_id, e);
            let _ = tokio::fs::remove_file(&cover).await;
        }
    }

    /// Tags, playlist entry, like and album save for a freshly stored track.
    fn attach_to_owner(
        &self,
        ctx: &IngestionContext,
        session: &mut ImportSession,
        track_id: TrackId,
        album_id: Option<AlbumId>,
    ) -> Result<(), IngestionError> {
        self.apply_tags(ctx, track_id)?;
        if self.add_to_playlist(ctx, session, track_id)? {
            session.next_position += 1;
        }
        if ctx.auto_likes() {
            self.store.like_track(ctx.owner_id, track_id)?;
            session.auto_liked = true;
        }
        if ctx.saves_album() {
            if let Some(album_id) = album_id {
                self.store
                    .save_library_item(ctx.owner_id, LibraryItemType::Album, album_id)?;
                session.album_saved = true;
            }
        }
        Ok(())
    }

    /// A file whose content is already in the library: reference the
    /// canonical track and drop the redundant copy.
    async fn record_duplicate(
        &self,
        ctx: &IngestionContext,
        session: &mut ImportSession,
        path: &Path,
        title: &str,
        track_id: TrackId,
    ) -> Result<FileOutcome, IngestionError> {
        info!("Track already exists: '{}' ({})", title, track_id);

        self.apply_tags(ctx, track_id)?;
        if self.add_to_playlist(ctx, session, track_id)? {
            session.next_position += 1;
        }

        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove redundant file {:?}: {}", path, e);
            }
        }
        Ok(FileOutcome::Skipped(SkippedTrack::duplicate(title, track_id)))
    }

    fn apply_tags(&self, ctx: &IngestionContext, track_id: TrackId) -> Result<(), IngestionError> {
        if let Some(tag_id) = ctx.tag_id {
            if !self.store.apply_tag(ctx.owner_id, track_id, tag_id)? {
                debug!("Tag {} not applied to track {}", tag_id, track_id);
            }
        }
        if let Some(global_tag_id) = ctx.global_tag_id {
            if !self
                .store
                .apply_global_tag(track_id, global_tag_id, ctx.owner_id)?
            {
                debug!("Global tag {} not applied to track {}", global_tag_id, track_id);
            }
        }
        Ok(())
    }

    /// Append at the session's next position, creating the run's playlist on
    /// first use. Only called for tracks that are already final, so a run
    /// whose files all roll back leaves no playlist behind.
    fn add_to_playlist(
        &self,
        ctx: &IngestionContext,
        session: &mut ImportSession,
        track_id: TrackId,
    ) -> Result<bool, IngestionError> {
        if !ctx.wants_playlist() {
            return Ok(false);
        }
        let playlist_id = match &session.playlist {
            Some(playlist) => playlist.id,
            None => {
                let description = format!("Imported from {}", ctx.source_url);
                let playlist = self.store.create_playlist(
                    ctx.owner_id,
                    ctx.source.playlist_name(),
                    Some(&description),
                )?;
                info!("Created playlist '{}' ({})", playlist.name, playlist.id);
                let id = playlist.id;
                session.playlist = Some(playlist);
                id
            }
        };
        self.store.append_playlist_track(
            playlist_id,
            track_id,
            session.next_position,
            ctx.owner_id,
        )?;
        Ok(true)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "track".to_string())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
