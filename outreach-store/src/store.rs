//! In-process job store and job state machine
//!
//! Every mutation happens under one mutex, and every value handed out is a
//! clone taken under that mutex. Pollers therefore always see a line item's
//! status together with the counters that include it.
//!
//! The store also owns the "which job is running" token: [`JobStore::claim_next`]
//! refuses to hand out a job while another one is running, and hands out
//! queued jobs in creation order.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use chrono::Utc;
use outreach_common::{internal, normalize_email};
use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    error::{Result, StoreError},
    model::{Batch, Job, JobCounts, JobStatus, LineItem, LineStatus, NewLineItem},
    types::{JobId, PrepareId},
};

#[derive(Debug)]
struct BatchEntry {
    batch: Batch,
    /// Queued or running job bound to this batch
    active_job: Option<JobId>,
    /// Most recent live job that started dispatching this batch
    delivered_by: Option<JobId>,
}

#[derive(Debug, Default)]
struct State {
    batches: HashMap<PrepareId, BatchEntry>,
    jobs: HashMap<JobId, Job>,
    /// Every job id in creation order
    order: Vec<JobId>,
    /// Jobs awaiting dispatch, oldest first. Cancelled entries are skipped lazily.
    queued: VecDeque<JobId>,
    running: Option<JobId>,
}

impl State {
    fn job_mut(&mut self, job_id: JobId) -> Result<&mut Job> {
        self.jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound(job_id))
    }

    fn running_job_mut(&mut self, job_id: JobId) -> Result<&mut Job> {
        let job = self.job_mut(job_id)?;
        if job.status == JobStatus::Running {
            Ok(job)
        } else {
            Err(StoreError::InvariantViolation {
                job_id,
                reason: format!("job is {}, not running", job.status),
            })
        }
    }

    /// Give up the running token and the batch binding held by `job_id`
    fn release(&mut self, job_id: JobId, prepare_id: PrepareId) {
        if self.running == Some(job_id) {
            self.running = None;
        }
        if let Some(entry) = self.batches.get_mut(&prepare_id)
            && entry.active_job == Some(job_id)
        {
            entry.active_job = None;
        }
    }
}

/// Result of a job creation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobCreation {
    pub job_id: JobId,
    /// `false` when an already active job was returned instead
    pub created: bool,
    pub status: JobStatus,
}

/// A job without its line items, for listings
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub prepare_id: PrepareId,
    pub dry_run: bool,
    pub status: JobStatus,
    pub counts: JobCounts,
    pub created_at: chrono::DateTime<Utc>,
    pub completed_at: Option<chrono::DateTime<Utc>>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.job_id,
            prepare_id: job.prepare_id,
            dry_run: job.dry_run,
            status: job.status,
            counts: job.counts,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Shared handle to the batch and job records
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    state: Arc<Mutex<State>>,
}

impl JobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a prepared batch and return its identifier.
    ///
    /// Recipient addresses are normalised; every item starts `pending`.
    pub fn create_batch(&self, tone: &str, items: Vec<NewLineItem>) -> Result<PrepareId> {
        if items.is_empty() {
            return Err(StoreError::InvalidBatch(
                "batch has no line items".to_string(),
            ));
        }

        let tone = tone.trim().to_lowercase();
        let items = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let recipient_email = normalize_email(&item.recipient_email)
                    .map_err(|source| StoreError::InvalidRecipient { index, source })?;
                Ok(LineItem {
                    recipient_email,
                    rendered_subject: item.rendered_subject,
                    rendered_body: item.rendered_body,
                    tone: tone.clone(),
                    status: LineStatus::Pending,
                    error_detail: None,
                    attempted_at: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let prepare_id = PrepareId::generate();
        let batch = Batch {
            prepare_id,
            tone,
            items: items.into(),
            created_at: Utc::now(),
        };

        internal!(
            level = DEBUG,
            prepare_id = %prepare_id,
            items = batch.len(),
            "Batch prepared"
        );

        self.state.lock().batches.insert(
            prepare_id,
            BatchEntry {
                batch,
                active_job: None,
                delivered_by: None,
            },
        );

        Ok(prepare_id)
    }

    pub fn get_batch(&self, prepare_id: PrepareId) -> Result<Batch> {
        self.state
            .lock()
            .batches
            .get(&prepare_id)
            .map(|entry| entry.batch.clone())
            .ok_or(StoreError::BatchNotFound(prepare_id))
    }

    /// Create a job for a batch.
    ///
    /// If a job with the same `dry_run` flag is already queued or running on
    /// the batch, its id is returned and nothing is created. An active job
    /// with the other flag is a [`StoreError::Conflict`].
    ///
    /// A live job on a batch that a previous live job already dispatched is
    /// created `completed`, carrying the earlier outcomes, and is never
    /// queued.
    pub fn create_job(&self, prepare_id: PrepareId, dry_run: bool) -> Result<JobCreation> {
        self.create(prepare_id, dry_run, false)
    }

    /// Like [`JobStore::create_job`], but any active job on the batch is a
    /// [`StoreError::Conflict`].
    pub fn create_job_exclusive(&self, prepare_id: PrepareId, dry_run: bool) -> Result<JobCreation> {
        self.create(prepare_id, dry_run, true)
    }

    fn create(&self, prepare_id: PrepareId, dry_run: bool, exclusive: bool) -> Result<JobCreation> {
        let mut state = self.state.lock();
        let state = &mut *state;

        let entry = state
            .batches
            .get_mut(&prepare_id)
            .ok_or(StoreError::BatchNotFound(prepare_id))?;

        if let Some(active) = entry.active_job {
            return match state.jobs.get(&active) {
                Some(job) if !exclusive && job.dry_run == dry_run => Ok(JobCreation {
                    job_id: active,
                    created: false,
                    status: job.status,
                }),
                _ => Err(StoreError::Conflict {
                    prepare_id,
                    job_id: active,
                }),
            };
        }

        let job_id = JobId::generate();
        let now = Utc::now();

        let replayed = if dry_run {
            None
        } else {
            entry
                .delivered_by
                .and_then(|previous| state.jobs.get(&previous))
                .map(|previous| (previous.job_id, previous.items.clone()))
        };

        let job = if let Some((previous, items)) = replayed {
            // Earlier failures stay visible: the replay is not a clean run
            let counts = JobCounts::tally(&items);
            internal!(
                level = INFO,
                job_id = %job_id,
                prepare_id = %prepare_id,
                replay_of = %previous,
                failed = counts.failed,
                "Batch already dispatched, recording a no-op job"
            );
            Job {
                job_id,
                prepare_id,
                dry_run,
                status: counts.completion_status(),
                created_at: now,
                started_at: Some(now),
                completed_at: Some(now),
                counts,
                failure_reason: None,
                replay_of: Some(previous),
                cancel_requested: false,
                items,
            }
        } else {
            let items = entry.batch.items.to_vec();
            entry.active_job = Some(job_id);
            state.queued.push_back(job_id);
            Job {
                job_id,
                prepare_id,
                dry_run,
                status: JobStatus::Queued,
                created_at: now,
                started_at: None,
                completed_at: None,
                counts: JobCounts::tally(&items),
                failure_reason: None,
                replay_of: None,
                cancel_requested: false,
                items,
            }
        };

        let status = job.status;
        state.jobs.insert(job_id, job);
        state.order.push(job_id);

        Ok(JobCreation {
            job_id,
            created: true,
            status,
        })
    }

    /// Snapshot of a job, including per-item detail
    pub fn get_status(&self, job_id: JobId) -> Result<Job> {
        self.state
            .lock()
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(StoreError::JobNotFound(job_id))
    }

    /// Aggregate counters only, without cloning the line items
    pub fn job_counts(&self, job_id: JobId) -> Result<JobCounts> {
        self.state
            .lock()
            .jobs
            .get(&job_id)
            .map(|job| job.counts)
            .ok_or(StoreError::JobNotFound(job_id))
    }

    /// All jobs, oldest first, without their items
    pub fn list_jobs(&self) -> Vec<JobSummary> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .map(JobSummary::from)
            .collect()
    }

    /// Number of jobs waiting for the dispatcher
    pub fn queued_len(&self) -> usize {
        let state = self.state.lock();
        state
            .queued
            .iter()
            .filter(|id| {
                state
                    .jobs
                    .get(id)
                    .is_some_and(|job| job.status == JobStatus::Queued)
            })
            .count()
    }

    pub fn running_job(&self) -> Option<JobId> {
        self.state.lock().running
    }

    /// Move the oldest queued job to `running` and return a snapshot of it.
    ///
    /// Returns `None` when nothing is queued or another job is still running.
    pub fn claim_next(&self) -> Option<Job> {
        let mut state = self.state.lock();
        if state.running.is_some() {
            return None;
        }

        while let Some(job_id) = state.queued.pop_front() {
            let Some(job) = state.jobs.get_mut(&job_id) else {
                continue;
            };
            if job.status != JobStatus::Queued {
                continue;
            }

            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            let snapshot = job.clone();

            state.running = Some(job_id);
            if !snapshot.dry_run
                && let Some(entry) = state.batches.get_mut(&snapshot.prepare_id)
            {
                entry.delivered_by = Some(job_id);
            }

            return Some(snapshot);
        }

        None
    }

    /// Record the terminal outcome of one line item of a running job.
    ///
    /// Line status, timestamp and counters change together. Recording over a
    /// terminal item, recording `pending`, or recording against a job that is
    /// not running is an [`StoreError::InvariantViolation`].
    pub fn record_outcome(
        &self,
        job_id: JobId,
        line_index: usize,
        status: LineStatus,
        error_detail: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let job = state.running_job_mut(job_id)?;

        if !status.is_terminal() {
            return Err(StoreError::InvariantViolation {
                job_id,
                reason: format!("line {line_index} cannot be moved back to {status}"),
            });
        }

        let len = job.items.len();
        let Some(item) = job.items.get_mut(line_index) else {
            return Err(StoreError::InvariantViolation {
                job_id,
                reason: format!("line {line_index} out of range ({len} items)"),
            });
        };

        if item.status.is_terminal() {
            return Err(StoreError::InvariantViolation {
                job_id,
                reason: format!(
                    "line {line_index} is already {}, refusing {status}",
                    item.status
                ),
            });
        }

        item.status = status;
        item.error_detail = error_detail;
        item.attempted_at = Some(Utc::now());
        job.counts.apply(status);

        Ok(())
    }

    /// Close a running job whose items are all terminal.
    ///
    /// The job ends `completed`, or `completed_with_errors` when any item
    /// failed.
    pub fn finish_job(&self, job_id: JobId) -> Result<JobStatus> {
        let mut state = self.state.lock();
        let job = state.running_job_mut(job_id)?;

        if let Some(index) = job.next_pending() {
            return Err(StoreError::InvariantViolation {
                job_id,
                reason: format!("cannot finish with line {index} still pending"),
            });
        }

        job.status = job.counts.completion_status();
        job.completed_at = Some(Utc::now());

        let (status, prepare_id) = (job.status, job.prepare_id);
        state.release(job_id, prepare_id);

        Ok(status)
    }

    /// Fail a running job: every pending item becomes `failed` with an
    /// "aborted" detail and the job ends `failed`.
    ///
    /// Returns how many items were aborted.
    pub fn abort_job(&self, job_id: JobId, reason: &str) -> Result<usize> {
        let mut state = self.state.lock();
        let job = state.running_job_mut(job_id)?;

        let aborted = close_pending(job, LineStatus::Failed, Some(&format!("aborted: {reason}")));
        job.status = JobStatus::Failed;
        job.failure_reason = Some(reason.to_string());
        job.completed_at = Some(Utc::now());

        let prepare_id = job.prepare_id;
        state.release(job_id, prepare_id);

        Ok(aborted)
    }

    /// Request cancellation.
    ///
    /// A queued job is cancelled at once and never dispatched. A running job
    /// is only flagged; the dispatcher finishes the in-flight item and then
    /// calls [`JobStore::complete_cancellation`].
    pub fn cancel_job(&self, job_id: JobId) -> Result<JobStatus> {
        let mut state = self.state.lock();
        let job = state.job_mut(job_id)?;

        match job.status {
            JobStatus::Queued => {
                close_pending(job, LineStatus::SkippedCancelled, None);
                job.status = JobStatus::Cancelled;
                job.cancel_requested = true;
                job.completed_at = Some(Utc::now());

                let prepare_id = job.prepare_id;
                state.release(job_id, prepare_id);
                Ok(JobStatus::Cancelled)
            }
            JobStatus::Running => {
                job.cancel_requested = true;
                Ok(JobStatus::Running)
            }
            status => Err(StoreError::AlreadyFinished { job_id, status }),
        }
    }

    pub fn cancellation_requested(&self, job_id: JobId) -> bool {
        self.state
            .lock()
            .jobs
            .get(&job_id)
            .is_some_and(|job| job.cancel_requested)
    }

    /// Close a running job that was flagged for cancellation: every pending
    /// item becomes `skipped_cancelled` and the job ends `cancelled`.
    pub fn complete_cancellation(&self, job_id: JobId) -> Result<usize> {
        let mut state = self.state.lock();
        let job = state.running_job_mut(job_id)?;

        let skipped = close_pending(job, LineStatus::SkippedCancelled, None);
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());

        let prepare_id = job.prepare_id;
        state.release(job_id, prepare_id);

        Ok(skipped)
    }
}

/// Move every pending item of `job` to `status`, returning how many moved
fn close_pending(job: &mut Job, status: LineStatus, detail: Option<&str>) -> usize {
    let mut closed = 0;
    for item in job.items.iter_mut().filter(|item| !item.status.is_terminal()) {
        item.status = status;
        item.error_detail = detail.map(ToString::to_string);
        job.counts.apply(status);
        closed += 1;
    }
    closed
}
