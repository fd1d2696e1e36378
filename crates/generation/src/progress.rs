//! Mapping from a provider's reported status onto the job lifecycle.

use serde::{Deserialize, Serialize};

use crate::status::JobStatus;

/// Status reported by an external generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProviderStatus {
    Waiting,
    Generating,
    Done,
    Failed { message: String },
}

/// What the orchestrator should do after a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Nothing changed; the job keeps its stage.
    Stay,
    Advance(JobStatus),
    /// The provider is done: download, upload, complete.
    Finalize,
    Fail(String),
}

impl NextStep {
    pub fn for_poll(current: JobStatus, reported: &ProviderStatus) -> Self {
        match reported {
            ProviderStatus::Waiting => NextStep::Stay,
            ProviderStatus::Generating if current == JobStatus::GeneratingViews => {
                NextStep::Advance(JobStatus::GeneratingModel)
            }
            ProviderStatus::Generating => NextStep::Stay,
            ProviderStatus::Done => NextStep::Finalize,
            ProviderStatus::Failed { message } => NextStep::Fail(message.clone()),
        }
    }
}
