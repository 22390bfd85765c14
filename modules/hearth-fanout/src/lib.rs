//! Fan-out layer: domain events in, zero or more feed records out.
//!
//! One domain event may surface in more than one feed scope, each scope an
//! independent record with independently derived visibility. Every branch
//! is individually caught and logged; a failed feed write never reaches the
//! domain-event source, because feed bookkeeping must not abort the action
//! that triggered it.

pub mod directory;
pub mod events;
pub mod router;

pub use directory::{EventDirectory, EventRecord, GroupDirectory, GroupRecord, UserDirectory, UserRecord};
pub use events::DomainEvent;
pub use router::FanoutRouter;
