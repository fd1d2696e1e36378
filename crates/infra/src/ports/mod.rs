//! Ports to external collaborators: generation providers and object storage.
//!
//! Both are async; the orchestrator wraps every call in a stage timeout.

pub mod object_store;
pub mod provider;

pub use object_store::{InMemoryObjectStore, ObjectStore, ObjectStoreError};
pub use provider::{GenerationProvider, ProviderError, ProviderRegistry, ResultAsset, SubmitRequest};
