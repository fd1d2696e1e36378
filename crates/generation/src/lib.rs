//! Generation jobs: the lifecycle of one external model/texture generation.

pub mod error;
pub mod job;
pub mod progress;
pub mod status;

pub use error::JobError;
pub use job::{
    AdvanceJob, CompleteJob, CreateJob, FailJob, Job, JobCommand, JobCompleted, JobCreated,
    JobEvent, JobFailed, JobId, JobSettings, JobType, ProviderTask, RecordSubmission, RetryJob,
    RetryStarted, StatusAdvanced, TaskSubmitted,
};
pub use progress::{NextStep, ProviderStatus};
pub use status::{JobStatus, JobStatusChange};
