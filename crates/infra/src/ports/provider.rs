use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use printforge_core::UserId;
use printforge_generation::{JobId, JobSettings, JobType, ProviderStatus, ProviderTask};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Result is not downloadable yet; worth a short bounded retry.
    #[error("provider result not ready")]
    NotReady,

    #[error("provider call timed out during {0}")]
    Timeout(String),

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Input handed to a provider when a job starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub job_id: JobId,
    pub user_id: UserId,
    pub job_type: JobType,
    pub input_refs: Vec<String>,
    pub settings: JobSettings,
}

/// One downloadable artifact of a finished task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultAsset {
    pub url: String,
    pub name: String,
}

/// External model/texture generation service.
#[async_trait::async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn submit(&self, request: &SubmitRequest) -> Result<ProviderTask, ProviderError>;

    async fn poll(&self, poll_ref: &str) -> Result<ProviderStatus, ProviderError>;

    async fn fetch_result(&self, task_ref: &str) -> Result<Vec<ResultAsset>, ProviderError>;

    async fn download_asset(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Provider implementations by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn GenerationProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn GenerationProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn GenerationProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl core::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
