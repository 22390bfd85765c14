//! The aggregation engine: one inbound activity in, one feed record out.
//!
//! For `none`-strategy activities every call inserts — one-shot activities
//! (creations, updates) must never be silently dropped, even under duplicate
//! delivery. Windowed activities collapse into their bucket's record: one
//! freshness read, then an atomic merge-or-insert. Repeated events from the
//! same actor inside a window are a no-op, which is what makes windowed
//! activities idempotent under at-least-once delivery.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use ulid::Ulid;
use uuid::Uuid;

use hearth_common::{FeedScope, HearthError};

use crate::aggregation_key::{self, SITEWIDE_TARGET};
use crate::store::ActivityStore;
use crate::types::{ActivityRecord, ActivityRequest, Aggregation, NewActivity};
use crate::visibility;

pub struct AggregationEngine {
    store: Arc<dyn ActivityStore>,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self { store }
    }

    /// Record one activity, stamped with the current time.
    pub async fn record(
        &self,
        tenant_id: Uuid,
        request: ActivityRequest,
    ) -> Result<ActivityRecord> {
        self.record_at(tenant_id, request, Utc::now()).await
    }

    /// Record one activity as of `now`. Storage failures propagate to the
    /// caller; catch-and-continue lives at the fan-out boundary, not here.
    pub async fn record_at(
        &self,
        tenant_id: Uuid,
        request: ActivityRequest,
        now: DateTime<Utc>,
    ) -> Result<ActivityRecord> {
        let visibility = visibility::resolve(request.parent_privacy);
        let metadata = build_metadata(&request);
        let actor_id = request.actor.as_ref().map(|a| a.id.clone());

        let window_minutes = match request.aggregation {
            Aggregation::None => {
                // One-shot: no prior lookup, always a new record.
                let activity = NewActivity {
                    external_id: Ulid::new().to_string(),
                    activity_type: request.activity_type,
                    feed_scope: request.feed_scope,
                    group_id: request.group_id,
                    event_id: request.event_id,
                    actor_id,
                    visibility,
                    metadata,
                    aggregation_key: None,
                    aggregation_strategy: request.aggregation.strategy(),
                    created_at: now,
                };
                debug!(activity_type = %activity.activity_type, %tenant_id, "inserting one-shot activity");
                return self.store.insert(tenant_id, activity).await;
            }
            Aggregation::TimeWindow { minutes } => minutes,
            Aggregation::Daily => 24 * 60,
        };

        let target_id = scope_target(&request)?;
        let key = aggregation_key::build_key(
            &request.activity_type,
            request.feed_scope,
            &target_id,
            window_minutes,
            now,
        );
        let cutoff = now - Duration::minutes(window_minutes);

        if let Some(existing) = self.store.find_fresh_by_key(tenant_id, &key, cutoff).await? {
            // An already-present actor (or an actorless repeat) is a no-op:
            // the record is returned unchanged and the window stays closed
            // to count inflation from duplicate delivery.
            match &actor_id {
                Some(actor) if !existing.has_actor(actor) => {}
                _ => return Ok(existing),
            }
        }

        let activity = NewActivity {
            external_id: Ulid::new().to_string(),
            activity_type: request.activity_type,
            feed_scope: request.feed_scope,
            group_id: request.group_id,
            event_id: request.event_id,
            actor_id,
            visibility,
            metadata,
            aggregation_key: Some(key.clone()),
            aggregation_strategy: request.aggregation.strategy(),
            created_at: now,
        };
        debug!(aggregation_key = %key, %tenant_id, "merging windowed activity");
        self.store.merge_or_insert(tenant_id, activity).await
    }
}

/// The id the aggregation key buckets on: the group for group-scoped
/// activity, the event for event-scoped, a fixed constant for sitewide.
fn scope_target(request: &ActivityRequest) -> Result<String> {
    match request.feed_scope {
        FeedScope::Group => request
            .group_id
            .map(|id| id.to_string())
            .ok_or_else(|| HearthError::Validation("group-scoped activity without group_id".into()).into()),
        FeedScope::Event => request
            .event_id
            .map(|id| id.to_string())
            .ok_or_else(|| HearthError::Validation("event-scoped activity without event_id".into()).into()),
        FeedScope::Sitewide => Ok(SITEWIDE_TARGET.to_string()),
    }
}

/// Caller metadata merged with denormalized actor display fields.
fn build_metadata(request: &ActivityRequest) -> serde_json::Value {
    let mut map = request.metadata.clone();
    if let Some(actor) = &request.actor {
        if let Some(slug) = &actor.slug {
            map.insert("actor_slug".to_string(), serde_json::Value::String(slug.clone()));
        }
        if let Some(name) = &actor.display_name {
            map.insert("actor_name".to_string(), serde_json::Value::String(name.clone()));
        }
    }
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActorRef;
    use hearth_common::ParentPrivacy;

    #[test]
    fn group_scope_requires_group_id() {
        let request = ActivityRequest::builder()
            .activity_type("member.joined")
            .feed_scope(FeedScope::Group)
            .parent_privacy(ParentPrivacy::Public)
            .build();
        assert!(scope_target(&request).is_err());
    }

    #[test]
    fn sitewide_scope_uses_the_constant_target() {
        let request = ActivityRequest::builder()
            .activity_type("group.created")
            .feed_scope(FeedScope::Sitewide)
            .parent_privacy(ParentPrivacy::Public)
            .build();
        assert_eq!(scope_target(&request).unwrap(), SITEWIDE_TARGET);
    }

    #[test]
    fn metadata_carries_actor_display_fields() {
        let request = ActivityRequest::builder()
            .activity_type("member.joined")
            .feed_scope(FeedScope::Group)
            .group_id(Some(7))
            .actor(Some(ActorRef {
                id: "u1".into(),
                slug: Some("ada".into()),
                display_name: Some("Ada".into()),
            }))
            .parent_privacy(ParentPrivacy::Public)
            .build();
        let metadata = build_metadata(&request);
        assert_eq!(metadata["actor_slug"], "ada");
        assert_eq!(metadata["actor_name"], "Ada");
    }
}
