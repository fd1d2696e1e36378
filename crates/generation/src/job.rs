use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printforge_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use printforge_events::Event;

use crate::error::JobError;
use crate::status::{JobStatus, JobStatusChange};

/// Generation job identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub AggregateId);

impl JobId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Model,
    Texture,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSettings {
    /// Provider name; the configured default is used when absent.
    pub provider: Option<String>,
    pub generate_views: bool,
    pub texture_prompt: Option<String>,
    pub face_limit: Option<u32>,
}

/// Handles returned by the provider on submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTask {
    pub task_ref: String,
    pub poll_ref: String,
}

/// Aggregate root: Job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    user_id: Option<UserId>,
    job_type: JobType,
    status: JobStatus,
    input_refs: Vec<String>,
    output_ref: Option<String>,
    provider: String,
    task: Option<ProviderTask>,
    settings: JobSettings,
    error: Option<String>,
    cost: u64,
    retry_count: u32,
    status_history: Vec<JobStatusChange>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Job {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: JobId) -> Self {
        Self {
            id,
            user_id: None,
            job_type: JobType::Model,
            status: JobStatus::Pending,
            input_refs: Vec::new(),
            output_ref: None,
            provider: String::new(),
            task: None,
            settings: JobSettings::default(),
            error: None,
            cost: 0,
            retry_count: 0,
            status_history: Vec::new(),
            created_at: None,
            updated_at: None,
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> JobId {
        self.id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn input_refs(&self) -> &[String] {
        &self.input_refs
    }

    pub fn output_ref(&self) -> Option<&str> {
        self.output_ref.as_deref()
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn task(&self) -> Option<&ProviderTask> {
        self.task.as_ref()
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn status_history(&self) -> &[JobStatusChange] {
        &self.status_history
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Job {
    type Id = JobId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateJob (credits already debited).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJob {
    pub job_id: JobId,
    pub user_id: UserId,
    pub job_type: JobType,
    pub input_refs: Vec<String>,
    pub provider: String,
    pub settings: JobSettings,
    pub cost: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordSubmission (provider accepted the task).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSubmission {
    pub job_id: JobId,
    pub task: ProviderTask,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdvanceJob to an intermediate stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceJob {
    pub job_id: JobId,
    pub to: JobStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteJob with the stored model reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteJob {
    pub job_id: JobId,
    pub output_ref: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FailJob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailJob {
    pub job_id: JobId,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RetryJob (re-run download and upload of a failed job).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryJob {
    pub job_id: JobId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobCommand {
    CreateJob(CreateJob),
    RecordSubmission(RecordSubmission),
    AdvanceJob(AdvanceJob),
    CompleteJob(CompleteJob),
    FailJob(FailJob),
    RetryJob(RetryJob),
}

/// Event: JobCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCreated {
    pub job_id: JobId,
    pub user_id: UserId,
    pub job_type: JobType,
    pub input_refs: Vec<String>,
    pub provider: String,
    pub settings: JobSettings,
    pub cost: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TaskSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubmitted {
    pub job_id: JobId,
    pub task: ProviderTask,
    pub change: JobStatusChange,
}

/// Event: StatusAdvanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAdvanced {
    pub job_id: JobId,
    pub change: JobStatusChange,
}

/// Event: JobCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCompleted {
    pub job_id: JobId,
    pub user_id: UserId,
    pub output_ref: String,
    pub change: JobStatusChange,
}

/// Event: JobFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailed {
    pub job_id: JobId,
    pub user_id: UserId,
    pub message: String,
    pub change: JobStatusChange,
}

/// Event: RetryStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStarted {
    pub job_id: JobId,
    pub attempt: u32,
    pub change: JobStatusChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEvent {
    JobCreated(JobCreated),
    TaskSubmitted(TaskSubmitted),
    StatusAdvanced(StatusAdvanced),
    JobCompleted(JobCompleted),
    JobFailed(JobFailed),
    RetryStarted(RetryStarted),
}

impl JobEvent {
    pub fn change(&self) -> Option<&JobStatusChange> {
        match self {
            JobEvent::JobCreated(_) => None,
            JobEvent::TaskSubmitted(e) => Some(&e.change),
            JobEvent::StatusAdvanced(e) => Some(&e.change),
            JobEvent::JobCompleted(e) => Some(&e.change),
            JobEvent::JobFailed(e) => Some(&e.change),
            JobEvent::RetryStarted(e) => Some(&e.change),
        }
    }
}

impl Event for JobEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JobEvent::JobCreated(_) => "generation.job.created",
            JobEvent::TaskSubmitted(_) => "generation.job.task_submitted",
            JobEvent::StatusAdvanced(_) => "generation.job.status_advanced",
            JobEvent::JobCompleted(_) => "generation.job.completed",
            JobEvent::JobFailed(_) => "generation.job.failed",
            JobEvent::RetryStarted(_) => "generation.job.retry_started",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobCreated(e) => e.occurred_at,
            other => other.change().map(|c| c.at).unwrap_or_default(),
        }
    }
}

impl Aggregate for Job {
    type Command = JobCommand;
    type Event = JobEvent;
    type Error = JobError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JobEvent::JobCreated(e) => {
                self.id = e.job_id;
                self.user_id = Some(e.user_id);
                self.job_type = e.job_type;
                self.status = JobStatus::Pending;
                self.input_refs = e.input_refs.clone();
                self.provider = e.provider.clone();
                self.settings = e.settings.clone();
                self.cost = e.cost;
                self.status_history = vec![JobStatusChange {
                    from: None,
                    to: JobStatus::Pending,
                    at: e.occurred_at,
                }];
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            JobEvent::TaskSubmitted(e) => {
                self.task = Some(e.task.clone());
            }
            JobEvent::StatusAdvanced(_) => {}
            JobEvent::JobCompleted(e) => {
                self.output_ref = Some(e.output_ref.clone());
                self.completed_at = Some(e.change.at);
            }
            JobEvent::JobFailed(e) => {
                self.error = Some(e.message.clone());
            }
            JobEvent::RetryStarted(e) => {
                self.retry_count = e.attempt;
                self.error = None;
            }
        }

        if let Some(change) = event.change() {
            self.status = change.to;
            self.updated_at = Some(change.at);
            self.status_history.push(change.clone());
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JobCommand::CreateJob(cmd) => self.handle_create(cmd),
            JobCommand::RecordSubmission(cmd) => self.handle_submission(cmd),
            JobCommand::AdvanceJob(cmd) => self.handle_advance(cmd),
            JobCommand::CompleteJob(cmd) => self.handle_complete(cmd),
            JobCommand::FailJob(cmd) => self.handle_fail(cmd),
            JobCommand::RetryJob(cmd) => self.handle_retry(cmd),
        }
    }
}

impl Job {
    fn ensure_created(&self, job_id: JobId) -> Result<UserId, DomainError> {
        let owner = match (self.created, self.user_id) {
            (true, Some(owner)) => owner,
            _ => return Err(DomainError::not_found()),
        };
        if self.id != job_id {
            return Err(DomainError::invariant("job_id mismatch"));
        }
        Ok(owner)
    }

    fn change_to(&self, to: JobStatus, at: DateTime<Utc>) -> Result<JobStatusChange, JobError> {
        if !self.status.can_transition_to(to) {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(JobStatusChange {
            from: Some(self.status),
            to,
            at,
        })
    }

    fn handle_create(&self, cmd: &CreateJob) -> Result<Vec<JobEvent>, JobError> {
        if self.created {
            return Err(DomainError::conflict("job already exists").into());
        }
        if cmd.cost == 0 {
            return Err(DomainError::validation("job cost must be positive").into());
        }
        if cmd.input_refs.iter().all(|r| r.trim().is_empty()) {
            return Err(DomainError::validation("job needs at least one input reference").into());
        }
        if cmd.provider.trim().is_empty() {
            return Err(DomainError::validation("provider is required").into());
        }

        Ok(vec![JobEvent::JobCreated(JobCreated {
            job_id: cmd.job_id,
            user_id: cmd.user_id,
            job_type: cmd.job_type,
            input_refs: cmd.input_refs.clone(),
            provider: cmd.provider.clone(),
            settings: cmd.settings.clone(),
            cost: cmd.cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submission(&self, cmd: &RecordSubmission) -> Result<Vec<JobEvent>, JobError> {
        self.ensure_created(cmd.job_id)?;

        if cmd.task.task_ref.trim().is_empty() {
            return Err(DomainError::validation("provider task reference is required").into());
        }
        let first_stage = if self.settings.generate_views {
            JobStatus::GeneratingViews
        } else {
            JobStatus::GeneratingModel
        };
        if self.status != JobStatus::Pending {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to: first_stage,
            });
        }

        Ok(vec![JobEvent::TaskSubmitted(TaskSubmitted {
            job_id: self.id,
            task: cmd.task.clone(),
            change: self.change_to(first_stage, cmd.occurred_at)?,
        })])
    }

    fn handle_advance(&self, cmd: &AdvanceJob) -> Result<Vec<JobEvent>, JobError> {
        self.ensure_created(cmd.job_id)?;

        // Terminal moves and the retry edge have dedicated commands.
        let dedicated = cmd.to.is_terminal() || self.status == JobStatus::Failed;
        if dedicated {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to: cmd.to,
            });
        }

        Ok(vec![JobEvent::StatusAdvanced(StatusAdvanced {
            job_id: self.id,
            change: self.change_to(cmd.to, cmd.occurred_at)?,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteJob) -> Result<Vec<JobEvent>, JobError> {
        let owner = self.ensure_created(cmd.job_id)?;

        if cmd.output_ref.trim().is_empty() {
            return Err(DomainError::validation("output reference is required").into());
        }

        Ok(vec![JobEvent::JobCompleted(JobCompleted {
            job_id: self.id,
            user_id: owner,
            output_ref: cmd.output_ref.clone(),
            change: self.change_to(JobStatus::Completed, cmd.occurred_at)?,
        })])
    }

    fn handle_fail(&self, cmd: &FailJob) -> Result<Vec<JobEvent>, JobError> {
        let owner = self.ensure_created(cmd.job_id)?;

        if self.status == JobStatus::Failed {
            return Ok(vec![]);
        }

        Ok(vec![JobEvent::JobFailed(JobFailed {
            job_id: self.id,
            user_id: owner,
            message: cmd.message.clone(),
            change: self.change_to(JobStatus::Failed, cmd.occurred_at)?,
        })])
    }

    fn handle_retry(&self, cmd: &RetryJob) -> Result<Vec<JobEvent>, JobError> {
        self.ensure_created(cmd.job_id)?;

        if self.status != JobStatus::Failed {
            return Err(JobError::NotRetryable {
                status: self.status,
                reason: format!("job is {}, only failed jobs can be retried", self.status),
            });
        }
        let usable = self
            .task
            .as_ref()
            .is_some_and(|t| !t.task_ref.trim().is_empty());
        if !usable {
            return Err(JobError::NotRetryable {
                status: self.status,
                reason: "no provider task reference".to_string(),
            });
        }

        Ok(vec![JobEvent::RetryStarted(RetryStarted {
            job_id: self.id,
            attempt: self.retry_count + 1,
            change: self.change_to(JobStatus::DownloadingModel, cmd.occurred_at)?,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printforge_events::execute;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created(generate_views: bool) -> Job {
        let job_id = JobId::generate();
        let mut job = Job::empty(job_id);
        let cmd = JobCommand::CreateJob(CreateJob {
            job_id,
            user_id: UserId::new(),
            job_type: JobType::Model,
            input_refs: vec!["uploads/front.png".to_string()],
            provider: "meshy".to_string(),
            settings: JobSettings {
                generate_views,
                ..JobSettings::default()
            },
            cost: 2,
            occurred_at: test_time(),
        });
        execute(&mut job, &cmd).unwrap();
        job
    }

    fn submit(job: &mut Job) {
        let cmd = JobCommand::RecordSubmission(RecordSubmission {
            job_id: job.id_typed(),
            task: ProviderTask {
                task_ref: "task-1".to_string(),
                poll_ref: "poll-1".to_string(),
            },
            occurred_at: test_time(),
        });
        execute(job, &cmd).unwrap();
    }

    fn advance(job: &Job, to: JobStatus) -> JobCommand {
        JobCommand::AdvanceJob(AdvanceJob {
            job_id: job.id_typed(),
            to,
            occurred_at: test_time(),
        })
    }

    fn fail(job: &Job, message: &str) -> JobCommand {
        JobCommand::FailJob(FailJob {
            job_id: job.id_typed(),
            message: message.to_string(),
            occurred_at: test_time(),
        })
    }

    fn retry(job: &Job) -> JobCommand {
        JobCommand::RetryJob(RetryJob {
            job_id: job.id_typed(),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn submission_enters_first_generation_stage() {
        let mut with_views = created(true);
        submit(&mut with_views);
        assert_eq!(with_views.status(), JobStatus::GeneratingViews);
        assert_eq!(with_views.task().unwrap().poll_ref, "poll-1");

        let mut model_only = created(false);
        submit(&mut model_only);
        assert_eq!(model_only.status(), JobStatus::GeneratingModel);
    }

    #[test]
    fn full_happy_path_records_every_stage() {
        let mut job = created(true);
        submit(&mut job);
        for to in [
            JobStatus::GeneratingModel,
            JobStatus::DownloadingModel,
            JobStatus::UploadingStorage,
        ] {
            let cmd = advance(&job, to);
            execute(&mut job, &cmd).unwrap();
        }
        let complete = JobCommand::CompleteJob(CompleteJob {
            job_id: job.id_typed(),
            output_ref: "models/u/j/model.glb".to_string(),
            occurred_at: test_time(),
        });
        execute(&mut job, &complete).unwrap();

        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.output_ref(), Some("models/u/j/model.glb"));
        assert!(job.completed_at().is_some());
        let stages: Vec<_> = job.status_history().iter().map(|c| c.to).collect();
        assert_eq!(
            stages,
            vec![
                JobStatus::Pending,
                JobStatus::GeneratingViews,
                JobStatus::GeneratingModel,
                JobStatus::DownloadingModel,
                JobStatus::UploadingStorage,
                JobStatus::Completed,
            ]
        );
    }

    #[test]
    fn complete_requires_upload_stage() {
        let mut job = created(false);
        submit(&mut job);
        let complete = JobCommand::CompleteJob(CompleteJob {
            job_id: job.id_typed(),
            output_ref: "x.glb".to_string(),
            occurred_at: test_time(),
        });
        assert_eq!(
            job.handle(&complete).unwrap_err(),
            JobError::InvalidTransition {
                from: JobStatus::GeneratingModel,
                to: JobStatus::Completed,
            }
        );
    }

    #[test]
    fn failing_twice_is_a_no_op() {
        let mut job = created(false);
        submit(&mut job);
        let cmd = fail(&job, "provider exploded");
        execute(&mut job, &cmd).unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error(), Some("provider exploded"));

        let version = job.version();
        let cmd = fail(&job, "again");
        let events = execute(&mut job, &cmd).unwrap();
        assert!(events.is_empty());
        assert_eq!(job.version(), version);
        assert_eq!(job.error(), Some("provider exploded"));
    }

    #[test]
    fn completed_job_cannot_fail() {
        let mut job = created(false);
        submit(&mut job);
        for to in [JobStatus::DownloadingModel, JobStatus::UploadingStorage] {
            let cmd = advance(&job, to);
            execute(&mut job, &cmd).unwrap();
        }
        let complete = JobCommand::CompleteJob(CompleteJob {
            job_id: job.id_typed(),
            output_ref: "x.glb".to_string(),
            occurred_at: test_time(),
        });
        execute(&mut job, &complete).unwrap();

        assert!(matches!(
            job.handle(&fail(&job, "late")).unwrap_err(),
            JobError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn retry_resumes_download_of_failed_job() {
        let mut job = created(false);
        submit(&mut job);
        let cmd = fail(&job, "download timed out");
        execute(&mut job, &cmd).unwrap();

        let cmd = retry(&job);

        execute(&mut job, &cmd).unwrap();

        assert_eq!(job.status(), JobStatus::DownloadingModel);
        assert_eq!(job.retry_count(), 1);
        assert_eq!(job.error(), None);
    }

    #[test]
    fn retry_needs_failed_status_and_task_ref() {
        let job = created(false);
        match job.handle(&retry(&job)).unwrap_err() {
            JobError::NotRetryable { status, .. } => assert_eq!(status, JobStatus::Pending),
            other => panic!("unexpected error: {other:?}"),
        }

        // Failed before the provider ever accepted the task.
        let mut never_submitted = created(false);
        let cmd = fail(&never_submitted, "submit failed");
        execute(&mut never_submitted, &cmd).unwrap();
        match never_submitted.handle(&retry(&never_submitted)).unwrap_err() {
            JobError::NotRetryable { reason, .. } => assert!(reason.contains("task reference")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn advance_cannot_take_the_retry_edge() {
        let mut job = created(false);
        submit(&mut job);
        let cmd = fail(&job, "boom");
        execute(&mut job, &cmd).unwrap();
        assert!(matches!(
            job.handle(&advance(&job, JobStatus::DownloadingModel)).unwrap_err(),
            JobError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn create_validates_cost_and_inputs() {
        let job = Job::empty(JobId::generate());
        let mut cmd = CreateJob {
            job_id: job.id_typed(),
            user_id: UserId::new(),
            job_type: JobType::Texture,
            input_refs: vec![],
            provider: "meshy".to_string(),
            settings: JobSettings::default(),
            cost: 1,
            occurred_at: test_time(),
        };
        assert!(matches!(
            job.handle(&JobCommand::CreateJob(cmd.clone())).unwrap_err(),
            JobError::Domain(DomainError::Validation(_))
        ));
        cmd.input_refs = vec!["models/u/j/model.glb".to_string()];
        cmd.cost = 0;
        assert!(matches!(
            job.handle(&JobCommand::CreateJob(cmd)).unwrap_err(),
            JobError::Domain(DomainError::Validation(_))
        ));
    }

    /// Reach `target` along forward edges (failed via the model stage).
    fn job_in(target: JobStatus) -> Job {
        use JobStatus::*;
        let mut job = created(target == GeneratingViews);
        if target == Pending {
            return job;
        }
        submit(&mut job);
        let path: &[JobStatus] = match target {
            Pending | GeneratingViews | GeneratingModel => &[],
            DownloadingModel => &[DownloadingModel],
            UploadingStorage | Completed => &[DownloadingModel, UploadingStorage],
            Failed => &[],
        };
        for to in path {
            let cmd = advance(&job, *to);
            execute(&mut job, &cmd).unwrap();
        }
        match target {
            Completed => {
                let cmd = JobCommand::CompleteJob(CompleteJob {
                    job_id: job.id_typed(),
                    output_ref: "x.glb".to_string(),
                    occurred_at: test_time(),
                });
                execute(&mut job, &cmd).unwrap();
            }
            Failed => {
                let cmd = fail(&job, "boom");
                execute(&mut job, &cmd).unwrap();
            }
            _ => {}
        }
        assert_eq!(job.status(), target);
        job
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn advance_honours_the_table(
            from in prop::sample::select(JobStatus::ALL.to_vec()),
            to in prop::sample::select(JobStatus::ALL.to_vec()),
        ) {
            let mut job = job_in(from);
            let snapshot = job.clone();
            let result = execute(&mut job, &advance(&snapshot, to));

            let allowed = from.can_transition_to(to) && !to.is_terminal() && from != JobStatus::Failed;
            if allowed {
                prop_assert!(result.is_ok());
                prop_assert_eq!(job.status(), to);
            } else {
                prop_assert!(result.is_err());
                prop_assert_eq!(job, snapshot);
            }
        }
    }
}
