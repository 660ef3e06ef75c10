//! Main download manager orchestration.
//!
//! Validates download requests, admits them to the scheduler and spawns the
//! task that carries each job through acquisition and ingestion.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::acquisition::AcquisitionBackend;
use super::job_processor::JobProcessor;
use super::models::*;
use super::scheduler::{JobScheduler, DEFAULT_WAIT_TIMEOUT};
use crate::ingestion::IngestionPipeline;
use crate::library::OwnerId;

pub struct DownloadManager {
    scheduler: Arc<JobScheduler>,
    processor: JobProcessor,
}

impl DownloadManager {
    pub fn new(
        scheduler: Arc<JobScheduler>,
        backend: Arc<dyn AcquisitionBackend>,
        pipeline: IngestionPipeline,
    ) -> Self {
        Self::with_wait_timeout(scheduler, backend, pipeline, DEFAULT_WAIT_TIMEOUT)
    }

    pub fn with_wait_timeout(
        scheduler: Arc<JobScheduler>,
        backend: Arc<dyn AcquisitionBackend>,
        pipeline: IngestionPipeline,
        wait_timeout: Duration,
    ) -> Self {
        let processor = JobProcessor::new(scheduler.clone(), backend, pipeline, wait_timeout);
        Self {
            scheduler,
            processor,
        }
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    /// Validate and admit a download request, then spawn its runner.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(
        &self,
        owner_id: OwnerId,
        download_type: &str,
        url: &str,
        tags: JobTags,
    ) -> Result<Job, AdmissionError> {
        let kind = JobKind::parse(download_type).ok_or_else(|| {
            warn!("Rejected download with type '{}'", download_type);
            AdmissionError::InvalidKind(download_type.to_string())
        })?;
        validate_url(url)?;

        let job = self.scheduler.submit(owner_id, kind, url.trim(), tags);
        info!(
            "Admitted job {} for owner {} (position {:?})",
            job.id, owner_id, job.position
        );

        let processor = self.processor.clone();
        let runner_job = job.clone();
        tokio::spawn(async move { processor.run(runner_job).await });

        Ok(job)
    }

    pub fn get_job(&self, job_id: &str, owner_id: OwnerId) -> Result<Job, LookupError> {
        self.scheduler.get_owned_job(job_id, owner_id)
    }

    pub fn list_jobs(&self, owner_id: OwnerId) -> Vec<Job> {
        self.scheduler.list_jobs(owner_id)
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.scheduler.queue_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download_manager::acquisition::AcquisitionError;
    use crate::ingestion::testing::{fake_audio, KeyValueInspector};
    use crate::ingestion::FileHandler;
    use crate::library::{LibraryStore, SqliteLibraryStore, StorageAccountant};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    /// Writes canned files per URL. When gated, each fetch waits for a permit
    /// so tests can hold jobs in PROCESSING.
    struct FakeBackend {
        files: HashMap<String, Vec<(String, Vec<u8>)>>,
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl AcquisitionBackend for FakeBackend {
        async fn fetch(&self, _: JobKind, url: &str, dest: &Path) -> Result<(), AcquisitionError> {
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            let Some(files) = self.files.get(url) else {
                return Err(AcquisitionError::NoFiles);
            };
            for (name, data) in files {
                tokio::fs::write(dest.join(name), data).await?;
            }
            Ok(())
        }
    }

    struct Fixture {
        _root: TempDir,
        store: Arc<SqliteLibraryStore>,
        manager: DownloadManager,
    }

    fn fixture(
        max_concurrent: usize,
        files: HashMap<String, Vec<(String, Vec<u8>)>>,
        gate: Option<Arc<Semaphore>>,
    ) -> Fixture {
        let root = TempDir::new().unwrap();
        let store = Arc::new(SqliteLibraryStore::in_memory().unwrap());
        let pipeline = IngestionPipeline::new(
            store.clone(),
            StorageAccountant::new(store.clone(), 1000.0),
            FileHandler::new(root.path().join("lib"), root.path().join("tmp")),
            Arc::new(KeyValueInspector),
        );
        let manager = DownloadManager::new(
            Arc::new(JobScheduler::new(max_concurrent)),
            Arc::new(FakeBackend { files, gate }),
            pipeline,
        );
        Fixture {
            _root: root,
            store,
            manager,
        }
    }

    async fn wait_terminal(manager: &DownloadManager, job_id: &str) -> Job {
        for _ in 0..500 {
            if let Some(job) = manager.scheduler().get_job(job_id) {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    #[tokio::test]
    async fn test_rejects_invalid_requests() {
        let f = fixture(1, HashMap::new(), None);
        assert_eq!(
            f.manager
                .submit(1, "soundcloud", "https://x.y", JobTags::default())
                .unwrap_err(),
            AdmissionError::InvalidKind("soundcloud".to_string())
        );
        assert!(matches!(
            f.manager.submit(1, "youtube", "", JobTags::default()),
            Err(AdmissionError::InvalidUrl(_))
        ));
        assert_eq!(f.manager.queue_stats().queue_length, 0);
    }

    #[tokio::test]
    async fn test_playlist_job_runs_to_completion() {
        let url = "https://open.spotify.com/playlist/abc";
        let files = HashMap::from([(
            url.to_string(),
            vec![
                ("01.mp3".to_string(), fake_audio(&[("title", "First")])),
                ("02.mp3".to_string(), fake_audio(&[("title", "Second")])),
            ],
        )]);
        let f = fixture(2, files, None);

        let job = f
            .manager
            .submit(1, "spotify", url, JobTags::default())
            .unwrap();
        let done = wait_terminal(&f.manager, &job.id).await;

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.message, "Download completed successfully");
        let result = done.result.unwrap();
        assert_eq!(result["type"], "playlist");
        assert_eq!(result["processed"], 2);
        assert_eq!(result["playlist"]["name"], "Imported from Spotify");
        assert_eq!(result["playlist"]["track_count"], 2);
        assert_eq!(f.store.get_tracks_count().unwrap(), 2);
        assert_eq!(f.manager.queue_stats().completed_count, 1);
    }

    #[tokio::test]
    async fn test_acquisition_failure_fails_job() {
        let f = fixture(1, HashMap::new(), None);

        let job = f
            .manager
            .submit(3, "youtube", "https://youtu.be/missing", JobTags::default())
            .unwrap();
        let done = wait_terminal(&f.manager, &job.id).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("No audio files were downloaded"));
        assert_eq!(f.manager.queue_stats().failed_count, 1);
    }

    #[tokio::test]
    async fn test_slots_bound_running_jobs() {
        let gate = Arc::new(Semaphore::new(0));
        let mut files = HashMap::new();
        for i in 0..5 {
            files.insert(
                format!("https://youtu.be/{}", i),
                vec![(format!("{}.mp3", i), fake_audio(&[("n", i.to_string().as_str())]))],
            );
        }
        let f = fixture(2, files, Some(gate.clone()));

        let jobs: Vec<Job> = (0..5)
            .map(|i| {
                f.manager
                    .submit(1, "youtube", &format!("https://youtu.be/{}", i), JobTags::default())
                    .unwrap()
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stats = f.manager.queue_stats();
        assert_eq!(stats.processing_count, 2);
        assert_eq!(stats.queue_length, 3);
        assert_eq!(f.manager.get_job(&jobs[4].id, 1).unwrap().position, Some(3));

        gate.add_permits(5);
        for job in &jobs {
            assert_eq!(wait_terminal(&f.manager, &job.id).await.status, JobStatus::Completed);
        }
        let stats = f.manager.queue_stats();
        assert_eq!(stats.processing_count, 0);
        assert_eq!(stats.completed_count, 5);
        assert_eq!(f.store.get_tracks_count().unwrap(), 5);
        // Single-video imports are auto-liked
        let listed = f.manager.list_jobs(1);
        assert_eq!(listed.len(), 5);
        assert_eq!(listed[0].id, jobs[4].id);
        assert_eq!(listed[0].result.as_ref().unwrap()["auto_liked"], true);
    }

    #[tokio::test]
    async fn test_job_gives_up_after_wait_timeout() {
        let gate = Arc::new(Semaphore::new(0));
        let files = HashMap::from([(
            "https://youtu.be/a".to_string(),
            vec![("a.mp3".to_string(), fake_audio(&[("title", "A")]))],
        )]);
        let root = TempDir::new().unwrap();
        let store = Arc::new(SqliteLibraryStore::in_memory().unwrap());
        let pipeline = IngestionPipeline::new(
            store.clone(),
            StorageAccountant::new(store, 1000.0),
            FileHandler::new(root.path().join("lib"), root.path().join("tmp")),
            Arc::new(KeyValueInspector),
        );
        let manager = DownloadManager::with_wait_timeout(
            Arc::new(JobScheduler::new(1)),
            Arc::new(FakeBackend {
                files,
                gate: Some(gate.clone()),
            }),
            pipeline,
            Duration::from_millis(50),
        );

        let blocker = manager
            .submit(1, "youtube", "https://youtu.be/a", JobTags::default())
            .unwrap();
        let starved = manager
            .submit(1, "youtube", "https://youtu.be/b", JobTags::default())
            .unwrap();

        let done = wait_terminal(&manager, &starved.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(
            done.error.as_deref(),
            Some("Timed out waiting for a download slot")
        );

        gate.add_permits(1);
        assert_eq!(
            wait_terminal(&manager, &blocker.id).await.status,
            JobStatus::Completed
        );
    }
}
