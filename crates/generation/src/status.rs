use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress of a generation job through the external provider stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    GeneratingViews,
    GeneratingModel,
    DownloadingModel,
    UploadingStorage,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Pending,
        JobStatus::GeneratingViews,
        JobStatus::GeneratingModel,
        JobStatus::DownloadingModel,
        JobStatus::UploadingStorage,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Forward edges. `failed -> downloading_model` is only taken by a retry.
    pub fn allowed_targets(self) -> &'static [JobStatus] {
        use JobStatus::*;
        match self {
            Pending => &[GeneratingViews, GeneratingModel, Failed],
            GeneratingViews => &[GeneratingModel, Failed],
            GeneratingModel => &[DownloadingModel, Failed],
            DownloadingModel => &[UploadingStorage, Failed],
            UploadingStorage => &[Completed, Failed],
            Failed => &[DownloadingModel],
            Completed => &[],
        }
    }

    pub fn can_transition_to(self, to: JobStatus) -> bool {
        self.allowed_targets().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Stages after the provider reported `done`; a job here resumes finalization.
    pub fn is_finalizing(self) -> bool {
        matches!(self, JobStatus::DownloadingModel | JobStatus::UploadingStorage)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::GeneratingViews => "generating_views",
            JobStatus::GeneratingModel => "generating_model",
            JobStatus::DownloadingModel => "downloading_model",
            JobStatus::UploadingStorage => "uploading_storage",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusChange {
    pub from: Option<JobStatus>,
    pub to: JobStatus,
    pub at: DateTime<Utc>,
}
