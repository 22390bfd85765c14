//! The fan-out policy table, as code.
//!
//! | Domain event   | Group record            | Sitewide record                    |
//! |----------------|-------------------------|------------------------------------|
//! | group created  | always                  | group public                       |
//! | member joined  | always, 60 min window   | group non-public: anonymized       |
//! | event created  | if event in group       | event and group public; standalone |
//! |                |                         | events go sitewide instead        |
//! | rsvp added     | group- or event-scoped, 30 min window | never               |
//! | event updated  | group- or event-scoped  | never                              |
//! | group updated  | always                  | never                              |
//! | milestone      | always                  | group public                       |

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use hearth_common::{FeedScope, ParentPrivacy};
use hearth_feed::{ActivityRecord, ActivityRequest, ActorRef, Aggregation, AggregationEngine};

use crate::directory::{EventDirectory, EventRecord, GroupDirectory, GroupRecord, UserDirectory};
use crate::events::DomainEvent;

pub const MEMBER_JOIN_WINDOW_MINUTES: i64 = 60;
pub const RSVP_WINDOW_MINUTES: i64 = 30;

/// Member-count thresholds that surface a `group.milestone` activity.
pub const MEMBER_MILESTONES: [i64; 10] = [10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000];

pub mod activity_types {
    pub const GROUP_CREATED: &str = "group.created";
    pub const GROUP_UPDATED: &str = "group.updated";
    pub const GROUP_MILESTONE: &str = "group.milestone";
    /// Anonymized sitewide surface for non-public group activity.
    pub const GROUP_ACTIVITY: &str = "group.activity";
    pub const MEMBER_JOINED: &str = "member.joined";
    pub const EVENT_CREATED: &str = "event.created";
    pub const EVENT_UPDATED: &str = "event.updated";
    pub const EVENT_RSVP: &str = "event.rsvp";
}

use activity_types::*;

/// Translates one domain event into aggregation engine calls per the policy
/// table above. Infallible from the caller's point of view: lookups that
/// miss skip their branch, storage failures are logged per branch.
pub struct FanoutRouter {
    engine: AggregationEngine,
    groups: Arc<dyn GroupDirectory>,
    events: Arc<dyn EventDirectory>,
    users: Arc<dyn UserDirectory>,
}

impl FanoutRouter {
    pub fn new(
        engine: AggregationEngine,
        groups: Arc<dyn GroupDirectory>,
        events: Arc<dyn EventDirectory>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            engine,
            groups,
            events,
            users,
        }
    }

    /// Handle one delivered domain event. Never returns an error: the
    /// triggering action has already succeeded, feed bookkeeping must not
    /// fail it retroactively.
    pub async fn handle(&self, tenant_id: Uuid, event: &DomainEvent) {
        match event {
            DomainEvent::GroupCreated { group_slug } => {
                self.on_group_created(tenant_id, group_slug).await
            }
            DomainEvent::GroupUpdated { group_slug } => {
                self.on_group_updated(tenant_id, group_slug).await
            }
            DomainEvent::MemberJoined {
                group_slug,
                user_id,
            } => self.on_member_joined(tenant_id, group_slug, user_id).await,
            DomainEvent::EventCreated { event_slug } => {
                self.on_event_created(tenant_id, event_slug).await
            }
            DomainEvent::EventUpdated { event_slug } => {
                self.on_event_updated(tenant_id, event_slug).await
            }
            DomainEvent::RsvpAdded {
                event_slug,
                user_id,
            } => self.on_rsvp_added(tenant_id, event_slug, user_id).await,
        }
    }

    async fn on_group_created(&self, tenant_id: Uuid, group_slug: &str) {
        let Some(group) = self.fetch_group(tenant_id, group_slug).await else {
            return;
        };

        self.record_logged(
            tenant_id,
            ActivityRequest::builder()
                .activity_type(GROUP_CREATED)
                .feed_scope(FeedScope::Group)
                .group_id(Some(group.id))
                .parent_privacy(group.privacy)
                .metadata(group_metadata(&group))
                .build(),
        )
        .await;

        if group.privacy.is_public() {
            // Public parent: the sitewide record carries the full slugs.
            self.record_logged(
                tenant_id,
                ActivityRequest::builder()
                    .activity_type(GROUP_CREATED)
                    .feed_scope(FeedScope::Sitewide)
                    .group_id(Some(group.id))
                    .parent_privacy(group.privacy)
                    .metadata(group_metadata(&group))
                    .build(),
            )
            .await;
        }
    }

    async fn on_group_updated(&self, tenant_id: Uuid, group_slug: &str) {
        let Some(group) = self.fetch_group(tenant_id, group_slug).await else {
            return;
        };

        self.record_logged(
            tenant_id,
            ActivityRequest::builder()
                .activity_type(GROUP_UPDATED)
                .feed_scope(FeedScope::Group)
                .group_id(Some(group.id))
                .parent_privacy(group.privacy)
                .metadata(group_metadata(&group))
                .build(),
        )
        .await;
    }

    async fn on_member_joined(&self, tenant_id: Uuid, group_slug: &str, user_id: &str) {
        let Some(group) = self.fetch_group(tenant_id, group_slug).await else {
            return;
        };
        let actor = self.fetch_actor(tenant_id, user_id).await;

        self.record_logged(
            tenant_id,
            ActivityRequest::builder()
                .activity_type(MEMBER_JOINED)
                .feed_scope(FeedScope::Group)
                .group_id(Some(group.id))
                .actor(Some(actor))
                .parent_privacy(group.privacy)
                .metadata(group_metadata(&group))
                .aggregation(Aggregation::TimeWindow {
                    minutes: MEMBER_JOIN_WINDOW_MINUTES,
                })
                .build(),
        )
        .await;

        if !group.privacy.is_public() {
            // Non-public groups still register as sitewide motion, but
            // anonymized: a bare counter, no slugs or names, actor reduced
            // to its id for dedup, visibility forced public by supplying a
            // public parent privacy.
            let mut metadata = Map::new();
            metadata.insert("anonymized".to_string(), Value::Bool(true));

            self.record_logged(
                tenant_id,
                ActivityRequest::builder()
                    .activity_type(GROUP_ACTIVITY)
                    .feed_scope(FeedScope::Sitewide)
                    .actor(Some(ActorRef::bare(user_id)))
                    .parent_privacy(ParentPrivacy::Public)
                    .metadata(metadata)
                    .aggregation(Aggregation::TimeWindow {
                        minutes: MEMBER_JOIN_WINDOW_MINUTES,
                    })
                    .build(),
            )
            .await;
        }

        self.check_milestone(tenant_id, &group).await;
    }

    /// Exact-match milestone check against the directory's member count.
    ///
    /// The count is read at call time, not transactionally reserved, so
    /// concurrent joins can observe the same threshold and double-fire.
    /// Milestone semantics are at-most-approximate.
    async fn check_milestone(&self, tenant_id: Uuid, group: &GroupRecord) {
        if !MEMBER_MILESTONES.contains(&group.member_count) {
            return;
        }

        let mut metadata = group_metadata(group);
        metadata.insert(
            "milestone".to_string(),
            Value::Number(group.member_count.into()),
        );

        self.record_logged(
            tenant_id,
            ActivityRequest::builder()
                .activity_type(GROUP_MILESTONE)
                .feed_scope(FeedScope::Group)
                .group_id(Some(group.id))
                .parent_privacy(group.privacy)
                .metadata(metadata.clone())
                .build(),
        )
        .await;

        if group.privacy.is_public() {
            self.record_logged(
                tenant_id,
                ActivityRequest::builder()
                    .activity_type(GROUP_MILESTONE)
                    .feed_scope(FeedScope::Sitewide)
                    .group_id(Some(group.id))
                    .parent_privacy(group.privacy)
                    .metadata(metadata)
                    .build(),
            )
            .await;
        }
    }

    async fn on_event_created(&self, tenant_id: Uuid, event_slug: &str) {
        let Some(event) = self.fetch_event(tenant_id, event_slug).await else {
            return;
        };

        match event.group_id {
            Some(group_id) => {
                let Some(group) = self.fetch_group_by_id(tenant_id, group_id).await else {
                    return;
                };

                let mut metadata = event_metadata(&event);
                metadata.insert("group_slug".to_string(), Value::String(group.slug.clone()));

                self.record_logged(
                    tenant_id,
                    ActivityRequest::builder()
                        .activity_type(EVENT_CREATED)
                        .feed_scope(FeedScope::Group)
                        .group_id(Some(group.id))
                        .event_id(Some(event.id))
                        .parent_privacy(event.privacy)
                        .metadata(metadata.clone())
                        .build(),
                )
                .await;

                if event.privacy.is_public() && group.privacy.is_public() {
                    self.record_logged(
                        tenant_id,
                        ActivityRequest::builder()
                            .activity_type(EVENT_CREATED)
                            .feed_scope(FeedScope::Sitewide)
                            .group_id(Some(group.id))
                            .event_id(Some(event.id))
                            .parent_privacy(event.privacy)
                            .metadata(metadata)
                            .build(),
                    )
                    .await;
                }
            }
            None => {
                // Standalone events have no group feed to land in; they
                // surface sitewide instead.
                self.record_logged(
                    tenant_id,
                    ActivityRequest::builder()
                        .activity_type(EVENT_CREATED)
                        .feed_scope(FeedScope::Sitewide)
                        .event_id(Some(event.id))
                        .parent_privacy(event.privacy)
                        .metadata(event_metadata(&event))
                        .build(),
                )
                .await;
            }
        }
    }

    async fn on_event_updated(&self, tenant_id: Uuid, event_slug: &str) {
        let Some(event) = self.fetch_event(tenant_id, event_slug).await else {
            return;
        };

        let (scope, group_id) = match event.group_id {
            Some(group_id) => (FeedScope::Group, Some(group_id)),
            None => (FeedScope::Event, None),
        };

        self.record_logged(
            tenant_id,
            ActivityRequest::builder()
                .activity_type(EVENT_UPDATED)
                .feed_scope(scope)
                .group_id(group_id)
                .event_id(Some(event.id))
                .parent_privacy(event.privacy)
                .metadata(event_metadata(&event))
                .build(),
        )
        .await;
    }

    async fn on_rsvp_added(&self, tenant_id: Uuid, event_slug: &str, user_id: &str) {
        let Some(event) = self.fetch_event(tenant_id, event_slug).await else {
            return;
        };
        let actor = self.fetch_actor(tenant_id, user_id).await;

        let (scope, group_id) = match event.group_id {
            Some(group_id) => (FeedScope::Group, Some(group_id)),
            None => (FeedScope::Event, None),
        };

        self.record_logged(
            tenant_id,
            ActivityRequest::builder()
                .activity_type(EVENT_RSVP)
                .feed_scope(scope)
                .group_id(group_id)
                .event_id(Some(event.id))
                .actor(Some(actor))
                .parent_privacy(event.privacy)
                .metadata(event_metadata(&event))
                .aggregation(Aggregation::TimeWindow {
                    minutes: RSVP_WINDOW_MINUTES,
                })
                .build(),
        )
        .await;
    }

    // --- collaborator access, branch-isolated ---

    async fn fetch_group(&self, tenant_id: Uuid, slug: &str) -> Option<GroupRecord> {
        match self.groups.group_by_slug(tenant_id, slug).await {
            Ok(Some(group)) => Some(group),
            Ok(None) => {
                warn!(%tenant_id, slug, "group not found, skipping fan-out branch");
                None
            }
            Err(e) => {
                warn!(error = %e, %tenant_id, slug, "group lookup failed, skipping fan-out branch");
                None
            }
        }
    }

    async fn fetch_group_by_id(&self, tenant_id: Uuid, id: i64) -> Option<GroupRecord> {
        match self.groups.group_by_id(tenant_id, id).await {
            Ok(Some(group)) => Some(group),
            Ok(None) => {
                warn!(%tenant_id, group_id = id, "group not found, skipping fan-out branch");
                None
            }
            Err(e) => {
                warn!(error = %e, %tenant_id, group_id = id, "group lookup failed, skipping fan-out branch");
                None
            }
        }
    }

    async fn fetch_event(&self, tenant_id: Uuid, slug: &str) -> Option<EventRecord> {
        match self.events.event_by_slug(tenant_id, slug).await {
            Ok(Some(event)) => Some(event),
            Ok(None) => {
                warn!(%tenant_id, slug, "event not found, skipping fan-out branch");
                None
            }
            Err(e) => {
                warn!(error = %e, %tenant_id, slug, "event lookup failed, skipping fan-out branch");
                None
            }
        }
    }

    /// The actor is display garnish, not a required parent: a miss degrades
    /// to a bare id rather than aborting the branch.
    async fn fetch_actor(&self, tenant_id: Uuid, user_id: &str) -> ActorRef {
        match self.users.user_by_id(tenant_id, user_id).await {
            Ok(Some(user)) => ActorRef {
                id: user.id,
                slug: Some(user.slug),
                display_name: Some(user.display_name),
            },
            Ok(None) => ActorRef::bare(user_id),
            Err(e) => {
                warn!(error = %e, %tenant_id, user_id, "user lookup failed, using bare actor id");
                ActorRef::bare(user_id)
            }
        }
    }

    async fn record_logged(
        &self,
        tenant_id: Uuid,
        request: ActivityRequest,
    ) -> Option<ActivityRecord> {
        let activity_type = request.activity_type.clone();
        let scope = request.feed_scope;
        match self.engine.record(tenant_id, request).await {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    error = %e,
                    %tenant_id,
                    activity_type,
                    scope = %scope,
                    "activity write failed, continuing with remaining fan-out branches"
                );
                None
            }
        }
    }
}

fn group_metadata(group: &GroupRecord) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("group_slug".to_string(), Value::String(group.slug.clone()));
    metadata.insert("group_name".to_string(), Value::String(group.name.clone()));
    metadata
}

fn event_metadata(event: &EventRecord) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("event_slug".to_string(), Value::String(event.slug.clone()));
    metadata.insert("event_title".to_string(), Value::String(event.title.clone()));
    metadata
}
