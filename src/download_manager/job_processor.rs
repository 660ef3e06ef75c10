//! Runs one admitted job from slot acquisition to its terminal state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use super::acquisition::{acquire, AcquisitionBackend};
use super::models::{Job, WaitOutcome};
use super::scheduler::JobScheduler;
use crate::ingestion::{IngestionContext, IngestionPipeline, IngestionReport};

/// Drives a job through the scheduler, the acquisition backend and the
/// ingestion pipeline.
///
/// Each admitted job gets its own task running [`JobProcessor::run`]:
/// 1. Park until the scheduler hands the job a slot
/// 2. Acquire files into a scratch dir
/// 3. Ingest them and report the outcome, freeing the slot
#[derive(Clone)]
pub struct JobProcessor {
    scheduler: Arc<JobScheduler>,
    backend: Arc<dyn AcquisitionBackend>,
    pipeline: IngestionPipeline,
    wait_timeout: Duration,
}

impl JobProcessor {
    pub fn new(
        scheduler: Arc<JobScheduler>,
        backend: Arc<dyn AcquisitionBackend>,
        pipeline: IngestionPipeline,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            scheduler,
            backend,
            pipeline,
            wait_timeout,
        }
    }

    pub async fn run(&self, job: Job) {
        match self
            .scheduler
            .wait_until_processing(&job.id, self.wait_timeout)
            .await
        {
            WaitOutcome::Processing => {}
            WaitOutcome::TimedOut => {
                warn!(
                    "Job {} did not start within {}s, giving up",
                    job.id,
                    self.wait_timeout.as_secs()
                );
                self.scheduler.abandon(
                    &job.id,
                    "Timed out waiting for a download slot".to_string(),
                );
                return;
            }
            outcome => {
                warn!("Job {} will not run: {:?}", job.id, outcome);
                return;
            }
        }

        info!("Processing job {} ({})", job.id, job.url);

        // Run the work in its own task so a panic still frees the slot
        let worker = {
            let processor = self.clone();
            let job = job.clone();
            tokio::spawn(async move { processor.execute(&job).await })
        };

        match worker.await {
            Ok(Ok(report)) => match serde_json::to_value(&report) {
                Ok(result) => {
                    self.scheduler.complete(&job.id, result);
                    info!(
                        "Job {} completed: {} processed, {} skipped, {} errored",
                        job.id, report.processed, report.skipped, report.errored
                    );
                }
                Err(e) => {
                    error!("Failed to serialize result of job {}: {}", job.id, e);
                    self.scheduler.fail(&job.id, e.to_string());
                }
            },
            Ok(Err(e)) => {
                error!("Job {} failed: {:#}", job.id, e);
                self.scheduler.fail(&job.id, format!("{:#}", e));
            }
            Err(join_error) => {
                error!("Job {} task aborted: {}", job.id, join_error);
                self.scheduler
                    .fail(&job.id, format!("Job task aborted: {}", join_error));
            }
        }
    }

    async fn execute(&self, job: &Job) -> Result<IngestionReport> {
        let acquired = acquire(
            self.backend.as_ref(),
            self.pipeline.file_handler(),
            &job.id,
            job.kind,
            &job.url,
        )
        .await?;

        let ctx = IngestionContext {
            owner_id: job.owner_id,
            source: job.kind.import_source(),
            shape: job.kind.detect_shape(&job.url),
            source_url: job.url.clone(),
            tag_id: job.tags.tag_id,
            global_tag_id: job.tags.global_tag_id,
        };
        let report = self.pipeline.ingest_files(&ctx, &acquired.files).await?;
        // Scratch dir and any skipped leftovers go away here
        drop(acquired);
        Ok(report)
    }
}
