use std::sync::Arc;

use serde::{Deserialize, Serialize};

use printforge_core::{ExpectedVersion, UserId};
use printforge_generation::{Job, JobId, JobStatus, JobType};

use super::snapshot::InMemorySnapshotStore;
use super::{Page, Pagination, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    pub user_id: Option<UserId>,
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.user_id.is_none_or(|u| job.user_id() == Some(u))
            && self.status.is_none_or(|s| job.status() == s)
            && self.job_type.is_none_or(|t| job.job_type() == t)
    }
}

/// Job persistence port.
pub trait JobRepository: Send + Sync {
    fn insert(&self, job: &Job) -> Result<(), StoreError>;

    fn save(&self, job: &Job, expected: ExpectedVersion) -> Result<(), StoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, StoreError>;

    /// Newest first.
    fn list(&self, filter: &JobFilter, page: Pagination) -> Result<Page<Job>, StoreError>;
}

impl<S> JobRepository for Arc<S>
where
    S: JobRepository + ?Sized,
{
    fn insert(&self, job: &Job) -> Result<(), StoreError> {
        (**self).insert(job)
    }

    fn save(&self, job: &Job, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).save(job, expected)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        (**self).get(job_id)
    }

    fn list(&self, filter: &JobFilter, page: Pagination) -> Result<Page<Job>, StoreError> {
        (**self).list(filter, page)
    }
}

impl JobRepository for InMemorySnapshotStore<JobId, Job> {
    fn insert(&self, job: &Job) -> Result<(), StoreError> {
        InMemorySnapshotStore::insert(self, job)
    }

    fn save(&self, job: &Job, expected: ExpectedVersion) -> Result<(), StoreError> {
        InMemorySnapshotStore::save(self, job, expected)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        InMemorySnapshotStore::get(self, &job_id)
    }

    fn list(&self, filter: &JobFilter, page: Pagination) -> Result<Page<Job>, StoreError> {
        let mut jobs = self.select(|j| filter.matches(j))?;
        jobs.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id_typed().cmp(&a.id_typed()))
        });
        Ok(page.apply(jobs))
    }
}
