//! Core types for the activity feed. The record shapes here are the only
//! persisted surface this subsystem owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use hearth_common::{AggregationStrategy, FeedScope, ParentPrivacy, Visibility};

/// A feed record as stored. Returned by all read methods.
///
/// Merge-only after creation: a windowed merge may touch `actor_id`,
/// `actor_ids`, `aggregated_count`, and `updated_at`; every other field is
/// immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: i64,
    /// ULID, assigned once at creation. Lexicographically sortable.
    pub external_id: String,
    pub tenant_id: Uuid,
    /// Namespaced tag, e.g. `member.joined`, `event.created`.
    pub activity_type: String,
    pub feed_scope: FeedScope,
    pub group_id: Option<i64>,
    pub event_id: Option<i64>,
    /// Most recent contributing actor.
    pub actor_id: Option<String>,
    /// Distinct contributing actors, in order of first appearance.
    pub actor_ids: Vec<String>,
    /// Derived from the parent entity's privacy at creation time.
    pub visibility: Visibility,
    /// Denormalized display data (slugs, names). Readers never join.
    pub metadata: serde_json::Value,
    /// Present iff the strategy is windowed.
    pub aggregation_key: Option<String>,
    pub aggregation_strategy: AggregationStrategy,
    pub aggregated_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn has_actor(&self, actor_id: &str) -> bool {
        self.actor_ids.iter().any(|a| a == actor_id)
    }
}

/// A record to be written. The engine builds this; the store assigns `id`.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub external_id: String,
    pub activity_type: String,
    pub feed_scope: FeedScope,
    pub group_id: Option<i64>,
    pub event_id: Option<i64>,
    pub actor_id: Option<String>,
    pub visibility: Visibility,
    pub metadata: serde_json::Value,
    pub aggregation_key: Option<String>,
    pub aggregation_strategy: AggregationStrategy,
    pub created_at: DateTime<Utc>,
}

/// The triggering actor, with optional denormalized display fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRef {
    pub id: String,
    pub slug: Option<String>,
    pub display_name: Option<String>,
}

impl ActorRef {
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            slug: None,
            display_name: None,
        }
    }
}

/// Aggregation requested for one activity. `Daily` is a 24-hour window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    None,
    TimeWindow { minutes: i64 },
    Daily,
}

impl Aggregation {
    pub fn strategy(&self) -> AggregationStrategy {
        match self {
            Aggregation::None => AggregationStrategy::None,
            Aggregation::TimeWindow { .. } => AggregationStrategy::TimeWindow,
            Aggregation::Daily => AggregationStrategy::Daily,
        }
    }

    /// Window size in minutes; `None` for unaggregated activities.
    pub fn window_minutes(&self) -> Option<i64> {
        match self {
            Aggregation::None => None,
            Aggregation::TimeWindow { minutes } => Some(*minutes),
            Aggregation::Daily => Some(24 * 60),
        }
    }
}

/// One inbound activity for the engine. Callers supply the parent's privacy
/// setting, never a feed visibility value.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ActivityRequest {
    #[builder(setter(into))]
    pub activity_type: String,
    pub feed_scope: FeedScope,
    #[builder(default)]
    pub group_id: Option<i64>,
    #[builder(default)]
    pub event_id: Option<i64>,
    #[builder(default)]
    pub actor: Option<ActorRef>,
    pub parent_privacy: ParentPrivacy,
    #[builder(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[builder(default = Aggregation::None)]
    pub aggregation: Aggregation,
}

/// A scoped, paginated feed read. An empty `visibility` set means no
/// visibility filter; the caller decides the set from the viewer's state.
#[derive(Debug, Clone)]
pub struct FeedQuery {
    pub scope: FeedScope,
    pub group_id: Option<i64>,
    pub event_id: Option<i64>,
    pub visibility: Vec<Visibility>,
    pub limit: i64,
    pub offset: i64,
}

impl FeedQuery {
    pub fn sitewide(limit: i64, offset: i64) -> Self {
        Self {
            scope: FeedScope::Sitewide,
            group_id: None,
            event_id: None,
            visibility: Vec::new(),
            limit,
            offset,
        }
    }

    pub fn group(group_id: i64, limit: i64, offset: i64) -> Self {
        Self {
            scope: FeedScope::Group,
            group_id: Some(group_id),
            event_id: None,
            visibility: Vec::new(),
            limit,
            offset,
        }
    }

    pub fn event(event_id: i64, limit: i64, offset: i64) -> Self {
        Self {
            scope: FeedScope::Event,
            group_id: None,
            event_id: Some(event_id),
            visibility: Vec::new(),
            limit,
            offset,
        }
    }

    pub fn with_visibility(mut self, visibility: Vec<Visibility>) -> Self {
        self.visibility = visibility;
        self
    }
}
