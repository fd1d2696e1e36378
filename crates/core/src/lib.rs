//! `printforge-core`: shared domain building blocks.
//!
//! Pure types only: identifiers, the actor model, the aggregate contract and the
//! domain error. Nothing in here performs IO.

pub mod actor;
pub mod aggregate;
pub mod error;
pub mod id;

pub use actor::Actor;
pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AdminId, AggregateId, UserId};
