//! Domain events and the outbound notification port.
//!
//! Aggregates describe what happened as typed events (`Event`). After a state
//! change is persisted, infra turns those events into `Notification`s and hands
//! them to a `Notifier`, which is fire-and-forget from the core's point of view.

pub mod event;
pub mod handler;
pub mod notification;
pub mod notifier;

pub use event::Event;
pub use handler::execute;
pub use notification::Notification;
pub use notifier::{InMemoryNotifier, Notifier, NotifyError, Subscription};
