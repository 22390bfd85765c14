//! Activity feed core: aggregation engine, activity store, and feed reader.
//!
//! Domain events enter through the fan-out router (`hearth-fanout`), which
//! translates them into [`ActivityRequest`]s. The [`AggregationEngine`]
//! resolves visibility, collapses bursts into windowed records, and writes
//! through the [`ActivityStore`]. The [`FeedReader`] serves scoped,
//! visibility-filtered pages ordered by last update.
//!
//! Tenancy is explicit: every store and engine call carries a `tenant_id`.
//! There is no ambient tenant context.

pub mod aggregation_key;
pub mod engine;
pub mod memory;
pub mod reader;
pub mod store;
pub mod types;
pub mod visibility;

pub use engine::AggregationEngine;
pub use memory::MemoryActivityStore;
pub use reader::{ActorNameResolver, CachingNameResolver, FeedReader};
pub use store::{ActivityStore, PgActivityStore};
pub use types::{ActivityRecord, ActivityRequest, ActorRef, Aggregation, FeedQuery, NewActivity};
