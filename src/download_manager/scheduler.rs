//! In-memory FIFO job scheduler with a fixed number of processing slots.

use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use super::models::*;
use crate::library::OwnerId;

pub const DEFAULT_MAX_CONCURRENT: usize = 3;
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(3600);

struct Entry {
    job: Job,
    seq: u64,
}

/// Finished job ids per owner, oldest first.
#[derive(Default)]
struct OwnerHistory {
    completed: VecDeque<String>,
    failed: VecDeque<String>,
}

#[derive(Default)]
struct SchedulerState {
    jobs: HashMap<String, Entry>,
    queue: VecDeque<String>,
    processing: HashSet<String>,
    history: HashMap<OwnerId, OwnerHistory>,
    next_seq: u64,
    /// Millisecond stamp of the last issued id. Ids are never reissued,
    /// even after their job is evicted.
    last_id_millis: i64,
    completed_count: u64,
    failed_count: u64,
}

impl SchedulerState {
    fn renumber(&mut self) {
        for (index, id) in self.queue.iter().enumerate() {
            if let Some(entry) = self.jobs.get_mut(id) {
                entry.job.position = Some(index + 1);
                entry.job.message = queued_message(index + 1);
            }
        }
    }

    fn unique_id(&mut self, owner_id: OwnerId) -> String {
        let millis = Utc::now()
            .timestamp_millis()
            .max(self.last_id_millis + 1);
        self.last_id_millis = millis;
        format!("{}_{}", owner_id, millis)
    }
}

/// Admits download jobs and hands them processing slots in arrival order.
///
/// Jobs move QUEUED -> PROCESSING -> COMPLETED | FAILED. All state sits
/// behind one mutex that is only held for bookkeeping. Every transition
/// bumps a watch channel so waiters wake without polling.
pub struct JobScheduler {
    state: Mutex<SchedulerState>,
    max_concurrent: usize,
    history_limit: usize,
    changes: watch::Sender<u64>,
}

impl JobScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self::with_history_limit(max_concurrent, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(max_concurrent: usize, history_limit: usize) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: Mutex::new(SchedulerState::default()),
            max_concurrent: max_concurrent.max(1),
            history_limit,
            changes,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Admit a job at the tail of the queue and dispatch. Never blocks on
    /// capacity.
    pub fn submit(&self, owner_id: OwnerId, kind: JobKind, url: &str, tags: JobTags) -> Job {
        let job = {
            let mut state = self.state.lock().unwrap();
            let id = state.unique_id(owner_id);
            let job = Job {
                id: id.clone(),
                owner_id,
                kind,
                url: url.to_string(),
                status: JobStatus::Queued,
                position: None,
                message: MESSAGE_ADDED.to_string(),
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
                error: None,
                result: None,
                tags,
            };
            let seq = state.next_seq;
            state.next_seq += 1;
            state.jobs.insert(id.clone(), Entry { job, seq });
            state.queue.push_back(id.clone());
            state.renumber();
            self.dispatch_locked(&mut state);
            state.jobs[&id].job.clone()
        };
        info!(
            "Queued {} job {} for owner {}: {}",
            kind.as_str(),
            job.id,
            owner_id,
            job.url
        );
        self.notify();
        job
    }

    /// Move queued jobs into free slots. Runs after every submission and
    /// termination, and may be called at any time.
    pub fn dispatch(&self) {
        let moved = {
            let mut state = self.state.lock().unwrap();
            self.dispatch_locked(&mut state)
        };
        if moved > 0 {
            self.notify();
        }
    }

    fn dispatch_locked(&self, state: &mut SchedulerState) -> usize {
        let mut moved = 0;
        while state.processing.len() < self.max_concurrent {
            let Some(id) = state.queue.pop_front() else {
                break;
            };
            if let Some(entry) = state.jobs.get_mut(&id) {
                entry.job.status = JobStatus::Processing;
                entry.job.position = None;
                entry.job.message = MESSAGE_DOWNLOADING.to_string();
                entry.job.started_at = Some(Utc::now());
                debug!("Dispatched job {}", id);
            }
            state.processing.insert(id);
            moved += 1;
        }
        if moved > 0 {
            state.renumber();
        }
        moved
    }

    /// Record a successful job. Returns false if the job was not processing.
    pub fn complete(&self, job_id: &str, result: serde_json::Value) -> bool {
        self.finish(job_id, JobStatus::Completed, |job| {
            job.message = MESSAGE_COMPLETED.to_string();
            job.result = Some(result);
        })
    }

    /// Record a failed job. Returns false if the job was not processing.
    pub fn fail(&self, job_id: &str, error: String) -> bool {
        self.finish(job_id, JobStatus::Failed, |job| {
            job.message = MESSAGE_FAILED.to_string();
            job.error = Some(error);
        })
    }

    fn finish(&self, job_id: &str, status: JobStatus, apply: impl FnOnce(&mut Job)) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if !state.processing.remove(job_id) {
                debug!("Ignoring {:?} for job {} that is not processing", status, job_id);
                return false;
            }
            self.retire_locked(&mut state, job_id, status, apply);
            self.dispatch_locked(&mut state);
        }
        self.notify();
        true
    }

    /// Fail a job that never left the queue, e.g. because its runner gave
    /// up waiting for a slot. Returns false if the job is not queued.
    pub fn abandon(&self, job_id: &str, error: String) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            let Some(index) = state.queue.iter().position(|id| id == job_id) else {
                return false;
            };
            state.queue.remove(index);
            state.renumber();
            self.retire_locked(&mut state, job_id, JobStatus::Failed, |job| {
                job.position = None;
                job.message = MESSAGE_FAILED.to_string();
                job.error = Some(error);
            });
        }
        self.notify();
        true
    }

    /// Stamp a terminal status and move the job into its owner's history.
    fn retire_locked(
        &self,
        state: &mut SchedulerState,
        job_id: &str,
        status: JobStatus,
        apply: impl FnOnce(&mut Job),
    ) {
        let Some(entry) = state.jobs.get_mut(job_id) else {
            return;
        };
        entry.job.status = status;
        entry.job.completed_at = Some(Utc::now());
        apply(&mut entry.job);
        let owner_id = entry.job.owner_id;

        let history = state.history.entry(owner_id).or_default();
        let bucket = match status {
            JobStatus::Failed => &mut history.failed,
            _ => &mut history.completed,
        };
        bucket.push_back(job_id.to_string());
        let mut evicted = Vec::new();
        while bucket.len() > self.history_limit {
            if let Some(old) = bucket.pop_front() {
                evicted.push(old);
            }
        }
        for old in evicted {
            state.jobs.remove(&old);
            debug!("Evicted job {} from history of owner {}", old, owner_id);
        }

        match status {
            JobStatus::Failed => state.failed_count += 1,
            _ => state.completed_count += 1,
        }
    }

    /// Wait until the job leaves the queue, without polling.
    pub async fn wait_until_processing(&self, job_id: &str, timeout: Duration) -> WaitOutcome {
        let mut changes = self.changes.subscribe();
        let wait = async {
            loop {
                if let Some(outcome) = self.observe(job_id) {
                    return outcome;
                }
                if changes.changed().await.is_err() {
                    return WaitOutcome::NotFound;
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or(WaitOutcome::TimedOut)
    }

    fn observe(&self, job_id: &str) -> Option<WaitOutcome> {
        let state = self.state.lock().unwrap();
        match state.jobs.get(job_id).map(|e| e.job.status) {
            None => Some(WaitOutcome::NotFound),
            Some(JobStatus::Queued) => None,
            Some(JobStatus::Processing) => Some(WaitOutcome::Processing),
            Some(status) => Some(WaitOutcome::Finished(status)),
        }
    }

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        let state = self.state.lock().unwrap();
        state.jobs.get(job_id).map(|e| e.job.clone())
    }

    /// A job, as seen by `owner_id`.
    pub fn get_owned_job(&self, job_id: &str, owner_id: OwnerId) -> Result<Job, LookupError> {
        match self.get_job(job_id) {
            None => Err(LookupError::NotFound),
            Some(job) if job.owner_id != owner_id => Err(LookupError::Forbidden),
            Some(job) => Ok(job),
        }
    }

    /// All retained jobs of an owner, newest first.
    pub fn list_jobs(&self, owner_id: OwnerId) -> Vec<Job> {
        let state = self.state.lock().unwrap();
        let mut entries: Vec<&Entry> = state
            .jobs
            .values()
            .filter(|e| e.job.owner_id == owner_id)
            .collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        entries.into_iter().map(|e| e.job.clone()).collect()
    }

    pub fn queue_stats(&self) -> QueueStats {
        let state = self.state.lock().unwrap();
        QueueStats {
            queue_length: state.queue.len(),
            processing_count: state.processing.len(),
            max_concurrent: self.max_concurrent,
            completed_count: state.completed_count,
            failed_count: state.failed_count,
        }
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }
}
