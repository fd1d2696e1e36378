//! Orchestrator: reserves credits, drives order and job lifecycles, persists
//! every transition and compensates failures with refunds.
//!
//! It owns no state of its own. Work advances only when an operation is invoked
//! (create, poll, retry); there is no background loop.

pub mod jobs;
pub mod orders;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use printforge_core::{Actor, UserId};
use printforge_events::{Event, InMemoryNotifier, Notification, Notifier};
use printforge_generation::{Job, JobId};
use printforge_orders::{Order, OrderId, PriceLookup};

use crate::config::Config;
use crate::error::ServiceError;
use crate::ledger::LedgerService;
use crate::ports::{InMemoryObjectStore, ObjectStore, ProviderError, ProviderRegistry};
use crate::store::{
    CreditStore, GenerationCounter, InMemoryCreditStore, InMemoryGenerationCounter,
    InMemorySnapshotStore, JobRepository, OrderRepository,
};

pub use jobs::StartJob;
pub use orders::TransitionRequest;

/// Unit price lookup shared across requests.
pub type SharedPriceLookup = Arc<dyn PriceLookup + Send + Sync>;

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Ports {
    pub credits: Arc<dyn CreditStore>,
    pub orders: Arc<dyn OrderRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub counter: Arc<dyn GenerationCounter>,
    pub providers: ProviderRegistry,
    pub objects: Arc<dyn ObjectStore>,
    pub notifier: Arc<dyn Notifier>,
    pub prices: SharedPriceLookup,
}

impl Ports {
    /// In-memory stores and notifier for tests/dev.
    pub fn in_memory(providers: ProviderRegistry, prices: SharedPriceLookup) -> Self {
        Self {
            credits: Arc::new(InMemoryCreditStore::new()),
            orders: Arc::new(InMemorySnapshotStore::<OrderId, Order>::new()),
            jobs: Arc::new(InMemorySnapshotStore::<JobId, Job>::new()),
            counter: Arc::new(InMemoryGenerationCounter::new()),
            providers,
            objects: Arc::new(InMemoryObjectStore::default()),
            notifier: Arc::new(InMemoryNotifier::new()),
            prices,
        }
    }
}

pub struct Orchestrator {
    config: Config,
    ledger: LedgerService<Arc<dyn CreditStore>>,
    orders: Arc<dyn OrderRepository>,
    jobs: Arc<dyn JobRepository>,
    counter: Arc<dyn GenerationCounter>,
    providers: ProviderRegistry,
    objects: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    prices: SharedPriceLookup,
}

impl Orchestrator {
    pub fn new(config: Config, ports: Ports) -> Self {
        Self {
            ledger: LedgerService::new(ports.credits, config.ledger_max_retries),
            config,
            orders: ports.orders,
            jobs: ports.jobs,
            counter: ports.counter,
            providers: ports.providers,
            objects: ports.objects,
            notifier: ports.notifier,
            prices: ports.prices,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &LedgerService<Arc<dyn CreditStore>> {
        &self.ledger
    }

    /// Completed generations for `user_id`.
    pub fn generation_count(&self, user_id: UserId) -> Result<u64, ServiceError> {
        Ok(self.counter.get(user_id)?)
    }

    /// Fire-and-forget: a failing notifier is logged and never blocks the caller.
    fn publish<E>(&self, user_id: UserId, subject_id: &str, events: &[E])
    where
        E: Event + Serialize,
    {
        for event in events {
            let notification = Notification::from_event(user_id, subject_id, event);
            if let Err(err) = self.notifier.notify(notification) {
                warn!(
                    user_id = %user_id,
                    subject_id,
                    topic = event.event_type(),
                    error = %err,
                    "notification dropped"
                );
            }
        }
    }
}

fn ensure_may_act_for(actor: &Actor, owner: Option<UserId>) -> Result<(), ServiceError> {
    match owner {
        Some(owner) if actor.may_act_for(owner) => Ok(()),
        _ => Err(ServiceError::PermissionDenied(format!(
            "{actor} may not access this resource"
        ))),
    }
}

/// Run an external call under a stage timeout; elapsed time counts as a provider failure.
async fn within<T, E, F>(stage: &str, limit: Duration, call: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, E>>,
    ServiceError: From<E>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(ServiceError::from),
        Err(_) => Err(ProviderError::Timeout(stage.to_string()).into()),
    }
}
