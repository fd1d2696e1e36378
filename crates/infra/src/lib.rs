//! Infrastructure layer: stores, external ports, the credit ledger service and
//! the orchestrator that ties ledger and lifecycles together.

pub mod config;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod ports;
pub mod retry;
pub mod store;


pub use config::{Config, DownloadRetry, TimeoutConfig};
pub use error::ServiceError;
pub use ledger::{CreditOutcome, LedgerService};
pub use orchestrator::{Orchestrator, Ports, StartJob, TransitionRequest};
pub use retry::RetryPolicy;
