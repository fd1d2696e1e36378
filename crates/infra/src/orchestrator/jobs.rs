//! Generation jobs: debit, submit, poll, finalize, retry.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use printforge_core::{Actor, AggregateRoot, ExpectedVersion, UserId};
use printforge_events::execute;
use printforge_generation::{
    AdvanceJob, CompleteJob, CreateJob, FailJob, Job, JobCommand, JobId, JobSettings, JobStatus,
    JobType, NextStep, RecordSubmission, RetryJob,
};

use super::{Orchestrator, ensure_may_act_for, within};
use crate::error::ServiceError;
use crate::ports::object_store::{content_type_for, model_path};
use crate::ports::{GenerationProvider, ProviderError, ResultAsset, SubmitRequest};
use crate::store::{JobFilter, Page, Pagination};

/// Refund reason for a failed generation; one refund per job.
pub const JOB_FAILED_REASON: &str = "job_failed";

/// Reclaims the failure refund once a retried job completes.
pub const RETRY_COMPLETED_REASON: &str = "retry_completed";

/// Request to start a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartJob {
    pub user_id: UserId,
    pub job_type: JobType,
    pub input_refs: Vec<String>,
    pub settings: JobSettings,
    /// Credits reserved up front.
    pub cost: u64,
}

impl Orchestrator {
    /// Debit `cost`, create the job and submit it to the provider.
    ///
    /// Once the debit has happened, any later failure fails the job and refunds
    /// the credits before the error is returned.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, cost = request.cost), err)]
    pub async fn start_job(&self, request: StartJob) -> Result<Job, ServiceError> {
        let provider_name = request
            .settings
            .provider
            .clone()
            .unwrap_or_else(|| self.config.default_provider.clone());
        let provider = self.providers.get(&provider_name).ok_or_else(|| {
            ServiceError::Validation(format!("unknown generation provider: {provider_name}"))
        })?;

        let job_id = JobId::generate();
        let mut job = Job::empty(job_id);
        let cmd = JobCommand::CreateJob(CreateJob {
            job_id,
            user_id: request.user_id,
            job_type: request.job_type,
            input_refs: request.input_refs.clone(),
            provider: provider_name,
            settings: request.settings.clone(),
            cost: request.cost,
            occurred_at: Utc::now(),
        });
        // Validate before any credits move.
        let created = execute(&mut job, &cmd)?;

        self.ledger
            .debit(request.user_id, request.cost, Some(job_id.to_string()))?;

        if let Err(err) = self.jobs.insert(&job) {
            error!(job_id = %job_id, error = %err, "job insert failed after debit");
            self.refund_job(request.user_id, job_id, request.cost);
            return Err(err.into());
        }
        self.publish(request.user_id, &job_id.to_string(), &created);

        let submit = SubmitRequest {
            job_id,
            user_id: request.user_id,
            job_type: request.job_type,
            input_refs: request.input_refs,
            settings: request.settings,
        };
        let task = match within(
            "submit",
            self.config.timeouts.submit,
            provider.submit(&submit),
        )
        .await
        {
            Ok(task) => task,
            Err(err) => {
                self.fail_and_refund(&job, &err.to_string());
                return Err(err);
            }
        };

        let cmd = JobCommand::RecordSubmission(RecordSubmission {
            job_id,
            task,
            occurred_at: Utc::now(),
        });
        let job = self.apply_job(&job, &cmd)?;
        info!(job_id = %job_id, status = %job.status(), "generation job submitted");
        Ok(job)
    }

    /// Ask the provider for progress and advance the job accordingly.
    ///
    /// Terminal jobs are returned as stored, with no provider call and no side
    /// effects. Jobs stuck in download/upload resume finalization.
    #[instrument(skip(self), fields(job_id = %job_id), err)]
    pub async fn poll_job(&self, actor: &Actor, job_id: JobId) -> Result<Job, ServiceError> {
        let job = self.load_job(job_id)?;
        ensure_may_act_for(actor, job.user_id())?;

        if job.status().is_terminal() {
            return Ok(job);
        }
        if job.status().is_finalizing() {
            return self.finalize(job).await;
        }
        let Some(task) = job.task().cloned() else {
            warn!(job_id = %job_id, "job has no recorded provider task yet");
            return Ok(job);
        };

        let provider = self.provider_for(&job)?;
        let reported = match within("poll", self.config.timeouts.poll, provider.poll(&task.poll_ref))
            .await
        {
            Ok(reported) => reported,
            Err(err) => {
                self.fail_and_refund(&job, &err.to_string());
                return Err(err);
            }
        };

        match NextStep::for_poll(job.status(), &reported) {
            NextStep::Stay => Ok(job),
            NextStep::Advance(to) => {
                let cmd = JobCommand::AdvanceJob(AdvanceJob {
                    job_id,
                    to,
                    occurred_at: Utc::now(),
                });
                match self.apply_job(&job, &cmd) {
                    // A concurrent poll got there first.
                    Err(ServiceError::Conflict(_)) => self.load_job(job_id),
                    other => other,
                }
            }
            NextStep::Finalize => self.finalize(job).await,
            NextStep::Fail(message) => Ok(self.fail_and_refund(&job, &message)),
        }
    }

    /// Re-run download and upload for a failed job that reached its provider.
    ///
    /// The original debit covers the job, so nothing is charged up front. The
    /// failure already refunded that debit, though; on completion the refund is
    /// reclaimed once (`<job_id>:retry_completed`). A retry that fails again hits
    /// the spent `job_failed` key and moves no credits. The user must still hold
    /// the job's cost for the retry to start.
    #[instrument(skip(self), fields(job_id = %job_id), err)]
    pub async fn retry_job(&self, actor: &Actor, job_id: JobId) -> Result<Job, ServiceError> {
        let job = self.load_job(job_id)?;
        ensure_may_act_for(actor, job.user_id())?;

        if job.status() == JobStatus::Failed {
            if let Some(user_id) = job.user_id() {
                let available = self.ledger.balance(user_id)?;
                if available < job.cost() {
                    return Err(ServiceError::InsufficientBalance {
                        available,
                        requested: job.cost(),
                    });
                }
            }
        }

        let cmd = JobCommand::RetryJob(RetryJob {
            job_id,
            occurred_at: Utc::now(),
        });
        let job = self.apply_job(&job, &cmd)?;
        info!(job_id = %job_id, attempt = job.retry_count(), "retrying job finalization");
        self.finalize(job).await
    }

    pub fn get_job(&self, actor: &Actor, job_id: JobId) -> Result<Job, ServiceError> {
        let job = self.load_job(job_id)?;
        ensure_may_act_for(actor, job.user_id())?;
        Ok(job)
    }

    /// Users only ever see their own jobs.
    pub fn list_jobs(
        &self,
        actor: &Actor,
        mut filter: JobFilter,
        page: Pagination,
    ) -> Result<Page<Job>, ServiceError> {
        if let Some(user_id) = actor.user_id() {
            filter.user_id = Some(user_id);
        }
        Ok(self.jobs.list(&filter, page)?)
    }

    fn load_job(&self, job_id: JobId) -> Result<Job, ServiceError> {
        self.jobs
            .get(job_id)?
            .ok_or_else(|| ServiceError::not_found(format!("job {job_id}")))
    }

    fn provider_for(&self, job: &Job) -> Result<Arc<dyn GenerationProvider>, ServiceError> {
        self.providers.get(job.provider()).ok_or_else(|| {
            ServiceError::Internal(format!("provider {} is not registered", job.provider()))
        })
    }

    /// Execute `cmd` on a copy of `job`, persist it against the loaded version and
    /// notify the owner.
    fn apply_job(&self, job: &Job, cmd: &JobCommand) -> Result<Job, ServiceError> {
        let mut next = job.clone();
        let events = execute(&mut next, cmd)?;
        if events.is_empty() {
            return Ok(next);
        }
        self.jobs.save(&next, ExpectedVersion::Exact(job.version()))?;
        if let Some(user_id) = next.user_id() {
            self.publish(user_id, &next.id_typed().to_string(), &events);
        }
        Ok(next)
    }

    /// Download the provider result, upload it and complete the job.
    ///
    /// A stale snapshot means another call is finalizing the same job; that call
    /// owns the outcome and the stored job is returned untouched.
    async fn finalize(&self, job: Job) -> Result<Job, ServiceError> {
        match self.try_finalize(&job).await {
            Ok(done) => {
                if let Some(user_id) = done.user_id() {
                    match self.counter.increment(user_id) {
                        Ok(total) => info!(user_id = %user_id, total, "generation completed"),
                        Err(err) => {
                            warn!(user_id = %user_id, error = %err, "generation counter not updated")
                        }
                    }
                    if done.retry_count() > 0 {
                        self.reclaim_refund(user_id, &done);
                    }
                }
                Ok(done)
            }
            Err((latest, ServiceError::Conflict(msg))) => {
                info!(job_id = %latest.id_typed(), %msg, "job finalized concurrently");
                self.load_job(latest.id_typed())
            }
            Err((latest, err)) => {
                self.fail_and_refund(&latest, &err.to_string());
                Err(err)
            }
        }
    }

    /// On failure returns the last persisted state alongside the error.
    async fn try_finalize(&self, job: &Job) -> Result<Job, (Job, ServiceError)> {
        let mut job = job.clone();
        let job_id = job.id_typed();

        // Walk any remaining generation stages up to the download.
        for (from, to) in [
            (JobStatus::GeneratingViews, JobStatus::GeneratingModel),
            (JobStatus::GeneratingModel, JobStatus::DownloadingModel),
        ] {
            if job.status() == from {
                let cmd = JobCommand::AdvanceJob(AdvanceJob {
                    job_id,
                    to,
                    occurred_at: Utc::now(),
                });
                job = self.apply_job(&job, &cmd).map_err(|e| (job.clone(), e))?;
            }
        }

        let provider = self.provider_for(&job).map_err(|e| (job.clone(), e))?;
        let task_ref = match job.task() {
            Some(task) => task.task_ref.clone(),
            None => {
                let err = ServiceError::Internal("job has no provider task".to_string());
                return Err((job, err));
            }
        };

        let asset = self
            .fetch_asset(provider.as_ref(), &task_ref)
            .await
            .map_err(|e| (job.clone(), e))?;
        let bytes = within(
            "download",
            self.config.timeouts.download,
            provider.download_asset(&asset.url),
        )
        .await
        .map_err(|e| (job.clone(), e))?;

        if job.status() == JobStatus::DownloadingModel {
            let cmd = JobCommand::AdvanceJob(AdvanceJob {
                job_id,
                to: JobStatus::UploadingStorage,
                occurred_at: Utc::now(),
            });
            job = self.apply_job(&job, &cmd).map_err(|e| (job.clone(), e))?;
        }

        let Some(user_id) = job.user_id() else {
            let err = ServiceError::Internal("job has no owner".to_string());
            return Err((job, err));
        };
        let path = model_path(user_id, job_id, &asset.name);
        let output_ref = within(
            "upload",
            self.config.timeouts.upload,
            self.objects
                .put(&path, bytes, content_type_for(&asset.name)),
        )
        .await
        .map_err(|e| (job.clone(), e))?;

        let cmd = JobCommand::CompleteJob(CompleteJob {
            job_id,
            output_ref,
            occurred_at: Utc::now(),
        });
        self.apply_job(&job, &cmd).map_err(|e| (job.clone(), e))
    }

    /// `fetch_result` with a bounded fixed-backoff retry while the result is not ready.
    async fn fetch_asset(
        &self,
        provider: &dyn GenerationProvider,
        task_ref: &str,
    ) -> Result<ResultAsset, ServiceError> {
        let policy = self.config.download_retry.policy();
        let mut attempts = 0;
        let assets = loop {
            attempts += 1;
            match tokio::time::timeout(self.config.timeouts.fetch, provider.fetch_result(task_ref))
                .await
            {
                Ok(Ok(assets)) => break assets,
                Ok(Err(ProviderError::NotReady)) if policy.should_retry(attempts) => {
                    warn!(task_ref, attempts, "provider result not ready, retrying");
                    tokio::time::sleep(policy.delay_for_attempt(attempts)).await;
                }
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => return Err(ProviderError::Timeout("fetch".to_string()).into()),
            }
        };

        pick_model_asset(assets).ok_or_else(|| {
            ServiceError::Provider(format!("task {task_ref} finished without a model asset"))
        })
    }

    /// Mark the job failed (no-op if it already is) and refund its cost once.
    ///
    /// The refund follows only a persisted `failed` state. A job that completed
    /// meanwhile is returned as stored and keeps its debit. Compensation never
    /// surfaces its own errors; they are logged.
    fn fail_and_refund(&self, job: &Job, message: &str) -> Job {
        let job_id = job.id_typed();
        let stored = match self.mark_failed(job, message) {
            Ok(stored) => stored,
            Err(err) => {
                error!(job_id = %job_id, error = %err, "could not mark job failed, refund withheld");
                return job.clone();
            }
        };
        if stored.status() != JobStatus::Failed {
            info!(job_id = %job_id, status = %stored.status(), "job finished elsewhere, no refund");
            return stored;
        }
        warn!(job_id = %job_id, reason = message, "generation job failed");

        if let Some(user_id) = stored.user_id() {
            self.refund_job(user_id, job_id, stored.cost());
        }
        stored
    }

    /// `FailJob` against `job`, then once against a reloaded snapshot if `job` was
    /// stale. Terminal reloads are returned as they are.
    fn mark_failed(&self, job: &Job, message: &str) -> Result<Job, ServiceError> {
        let cmd = JobCommand::FailJob(FailJob {
            job_id: job.id_typed(),
            message: message.to_string(),
            occurred_at: Utc::now(),
        });
        match self.apply_job(job, &cmd) {
            Err(ServiceError::Conflict(_)) => {
                let latest = self.load_job(job.id_typed())?;
                if latest.status().is_terminal() {
                    return Ok(latest);
                }
                self.apply_job(&latest, &cmd)
            }
            other => other,
        }
    }

    fn refund_job(&self, user_id: UserId, job_id: JobId, cost: u64) {
        if let Err(err) =
            self.ledger
                .refund(user_id, cost, &job_id.to_string(), JOB_FAILED_REASON)
        {
            error!(user_id = %user_id, job_id = %job_id, error = %err, "job refund failed");
        }
    }

    /// A retried job was delivered after its cost came back; take it once more.
    fn reclaim_refund(&self, user_id: UserId, job: &Job) {
        let job_id = job.id_typed();
        if let Err(err) = self.ledger.reclaim(
            user_id,
            job.cost(),
            &job_id.to_string(),
            RETRY_COMPLETED_REASON,
        ) {
            error!(user_id = %user_id, job_id = %job_id, error = %err, "retry charge not reclaimed");
        }
    }
}

/// Prefer a `.glb`, then any known model format, then whatever came first.
fn pick_model_asset(assets: Vec<ResultAsset>) -> Option<ResultAsset> {
    let known = |asset: &ResultAsset, ext: &str| asset.name.to_ascii_lowercase().ends_with(ext);
    assets
        .iter()
        .find(|a| known(a, ".glb"))
        .or_else(|| assets.iter().find(|a| known(a, ".obj") || known(a, ".stl")))
        .or_else(|| assets.first())
        .cloned()
}
