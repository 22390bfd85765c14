//! Fan-out policy table behavior with stub directories.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use hearth_common::{AggregationStrategy, FeedScope, ParentPrivacy, Visibility};
use hearth_feed::{
    ActivityRecord, ActivityStore, AggregationEngine, FeedQuery, MemoryActivityStore, NewActivity,
};
use hearth_fanout::router::activity_types;
use hearth_fanout::{
    DomainEvent, EventDirectory, EventRecord, FanoutRouter, GroupDirectory, GroupRecord,
    UserDirectory, UserRecord,
};

struct StubGroups(HashMap<String, GroupRecord>);

#[async_trait]
impl GroupDirectory for StubGroups {
    async fn group_by_slug(&self, _tenant_id: Uuid, slug: &str) -> Result<Option<GroupRecord>> {
        Ok(self.0.get(slug).cloned())
    }

    async fn group_by_id(&self, _tenant_id: Uuid, id: i64) -> Result<Option<GroupRecord>> {
        Ok(self.0.values().find(|g| g.id == id).cloned())
    }
}

struct StubEvents(HashMap<String, EventRecord>);

#[async_trait]
impl EventDirectory for StubEvents {
    async fn event_by_slug(&self, _tenant_id: Uuid, slug: &str) -> Result<Option<EventRecord>> {
        Ok(self.0.get(slug).cloned())
    }
}

struct StubUsers(HashMap<String, UserRecord>);

#[async_trait]
impl UserDirectory for StubUsers {
    async fn user_by_id(&self, _tenant_id: Uuid, id: &str) -> Result<Option<UserRecord>> {
        Ok(self.0.get(id).cloned())
    }
}

fn group(id: i64, slug: &str, privacy: ParentPrivacy, member_count: i64) -> GroupRecord {
    GroupRecord {
        id,
        slug: slug.to_string(),
        name: format!("{slug} group"),
        privacy,
        member_count,
    }
}

fn event(id: i64, slug: &str, privacy: ParentPrivacy, group_id: Option<i64>) -> EventRecord {
    EventRecord {
        id,
        slug: slug.to_string(),
        title: format!("{slug} event"),
        privacy,
        group_id,
    }
}

fn user(id: &str) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        slug: format!("{id}-slug"),
        display_name: format!("{id} name"),
    }
}

struct Fixture {
    store: Arc<MemoryActivityStore>,
    router: FanoutRouter,
    tenant: Uuid,
}

fn fixture(groups: Vec<GroupRecord>, events: Vec<EventRecord>, users: Vec<UserRecord>) -> Fixture {
    let store = Arc::new(MemoryActivityStore::new());
    let engine = AggregationEngine::new(store.clone());
    let router = FanoutRouter::new(
        engine,
        Arc::new(StubGroups(
            groups.into_iter().map(|g| (g.slug.clone(), g)).collect(),
        )),
        Arc::new(StubEvents(
            events.into_iter().map(|e| (e.slug.clone(), e)).collect(),
        )),
        Arc::new(StubUsers(
            users.into_iter().map(|u| (u.id.clone(), u)).collect(),
        )),
    );
    Fixture {
        store,
        router,
        tenant: Uuid::new_v4(),
    }
}

#[tokio::test]
async fn public_group_member_join_produces_one_detailed_record() {
    let fx = fixture(
        vec![group(42, "rustaceans", ParentPrivacy::Public, 5)],
        vec![],
        vec![user("u1")],
    );

    fx.router
        .handle(
            fx.tenant,
            &DomainEvent::MemberJoined {
                group_slug: "rustaceans".to_string(),
                user_id: "u1".to_string(),
            },
        )
        .await;

    let records = fx.store.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.activity_type, activity_types::MEMBER_JOINED);
    assert_eq!(record.feed_scope, FeedScope::Group);
    assert_eq!(record.visibility, Visibility::Public);
    assert_eq!(record.aggregation_strategy, AggregationStrategy::TimeWindow);
    assert_eq!(record.metadata["group_slug"], "rustaceans");
    assert_eq!(record.metadata["actor_slug"], "u1-slug");
    assert_eq!(record.metadata["actor_name"], "u1 name");
}

#[tokio::test]
async fn private_group_member_join_fans_out_detailed_and_anonymized() {
    let fx = fixture(
        vec![group(42, "secret-society", ParentPrivacy::Private, 5)],
        vec![],
        vec![user("u1")],
    );

    fx.router
        .handle(
            fx.tenant,
            &DomainEvent::MemberJoined {
                group_slug: "secret-society".to_string(),
                user_id: "u1".to_string(),
            },
        )
        .await;

    let records = fx.store.records();
    assert_eq!(records.len(), 2);

    let detailed = records
        .iter()
        .find(|r| r.feed_scope == FeedScope::Group)
        .expect("group-scoped record");
    assert_eq!(detailed.activity_type, activity_types::MEMBER_JOINED);
    assert_eq!(detailed.visibility, Visibility::MembersOnly);
    assert_eq!(detailed.metadata["group_slug"], "secret-society");

    let anonymized = records
        .iter()
        .find(|r| r.feed_scope == FeedScope::Sitewide)
        .expect("sitewide record");
    assert_eq!(anonymized.activity_type, activity_types::GROUP_ACTIVITY);
    assert_eq!(anonymized.visibility, Visibility::Public);
    assert_eq!(anonymized.group_id, None);
    // Nothing identifying: no slugs, no names, just the counter flag.
    assert_eq!(anonymized.metadata["anonymized"], true);
    assert!(anonymized.metadata.get("group_slug").is_none());
    assert!(anonymized.metadata.get("group_name").is_none());
    assert!(anonymized.metadata.get("actor_slug").is_none());
    assert!(anonymized.metadata.get("actor_name").is_none());
    assert_eq!(anonymized.aggregation_strategy, AggregationStrategy::TimeWindow);
}

#[tokio::test]
async fn anonymized_sitewide_record_counts_distinct_members_across_private_groups() {
    let fx = fixture(
        vec![
            group(42, "secret-a", ParentPrivacy::Private, 5),
            group(43, "secret-b", ParentPrivacy::Private, 5),
        ],
        vec![],
        vec![user("u1"), user("u2")],
    );

    for (slug, uid) in [("secret-a", "u1"), ("secret-b", "u2")] {
        fx.router
            .handle(
                fx.tenant,
                &DomainEvent::MemberJoined {
                    group_slug: slug.to_string(),
                    user_id: uid.to_string(),
                },
            )
            .await;
    }

    let sitewide: Vec<ActivityRecord> = fx
        .store
        .records()
        .into_iter()
        .filter(|r| r.feed_scope == FeedScope::Sitewide)
        .collect();
    // Both private-group joins collapse into one sitewide pulse record.
    assert_eq!(sitewide.len(), 1);
    assert_eq!(sitewide[0].aggregated_count, 2);
}

#[tokio::test]
async fn group_created_fans_out_sitewide_only_when_public() {
    let fx = fixture(
        vec![
            group(1, "open", ParentPrivacy::Public, 1),
            group(2, "closed", ParentPrivacy::Private, 1),
        ],
        vec![],
        vec![],
    );

    fx.router
        .handle(
            fx.tenant,
            &DomainEvent::GroupCreated {
                group_slug: "open".to_string(),
            },
        )
        .await;
    fx.router
        .handle(
            fx.tenant,
            &DomainEvent::GroupCreated {
                group_slug: "closed".to_string(),
            },
        )
        .await;

    let records = fx.store.records();
    let open: Vec<_> = records.iter().filter(|r| r.group_id == Some(1)).collect();
    let closed: Vec<_> = records.iter().filter(|r| r.group_id == Some(2)).collect();

    assert_eq!(open.len(), 2);
    assert!(open.iter().any(|r| r.feed_scope == FeedScope::Sitewide));
    // The public sitewide record carries the full slugs.
    let sitewide = open
        .iter()
        .find(|r| r.feed_scope == FeedScope::Sitewide)
        .unwrap();
    assert_eq!(sitewide.metadata["group_slug"], "open");

    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].feed_scope, FeedScope::Group);
    assert_eq!(closed[0].visibility, Visibility::MembersOnly);
}

#[tokio::test]
async fn event_created_in_group_respects_both_privacy_settings() {
    let fx = fixture(
        vec![
            group(1, "open", ParentPrivacy::Public, 1),
            group(2, "closed", ParentPrivacy::Private, 1),
        ],
        vec![
            event(10, "public-in-open", ParentPrivacy::Public, Some(1)),
            event(11, "private-in-open", ParentPrivacy::Private, Some(1)),
            event(12, "public-in-closed", ParentPrivacy::Public, Some(2)),
        ],
        vec![],
    );

    for slug in ["public-in-open", "private-in-open", "public-in-closed"] {
        fx.router
            .handle(
                fx.tenant,
                &DomainEvent::EventCreated {
                    event_slug: slug.to_string(),
                },
            )
            .await;
    }

    let records = fx.store.records();
    // Only the fully public combination reaches the sitewide feed.
    let sitewide: Vec<_> = records
        .iter()
        .filter(|r| r.feed_scope == FeedScope::Sitewide)
        .collect();
    assert_eq!(sitewide.len(), 1);
    assert_eq!(sitewide[0].event_id, Some(10));

    let group_scoped: Vec<_> = records
        .iter()
        .filter(|r| r.feed_scope == FeedScope::Group)
        .collect();
    assert_eq!(group_scoped.len(), 3);
}

#[tokio::test]
async fn standalone_event_surfaces_sitewide_instead_of_group() {
    let fx = fixture(
        vec![],
        vec![event(10, "standalone", ParentPrivacy::Private, None)],
        vec![],
    );

    fx.router
        .handle(
            fx.tenant,
            &DomainEvent::EventCreated {
                event_slug: "standalone".to_string(),
            },
        )
        .await;

    let records = fx.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].feed_scope, FeedScope::Sitewide);
    assert_eq!(records[0].event_id, Some(10));
    assert_eq!(records[0].group_id, None);
    // Visibility still derives from the event's own privacy.
    assert_eq!(records[0].visibility, Visibility::MembersOnly);
}

#[tokio::test]
async fn rsvp_scopes_to_group_when_the_event_has_one() {
    let fx = fixture(
        vec![group(1, "open", ParentPrivacy::Public, 1)],
        vec![
            event(10, "in-group", ParentPrivacy::Public, Some(1)),
            event(11, "standalone", ParentPrivacy::Public, None),
        ],
        vec![user("u1")],
    );

    fx.router
        .handle(
            fx.tenant,
            &DomainEvent::RsvpAdded {
                event_slug: "in-group".to_string(),
                user_id: "u1".to_string(),
            },
        )
        .await;
    fx.router
        .handle(
            fx.tenant,
            &DomainEvent::RsvpAdded {
                event_slug: "standalone".to_string(),
                user_id: "u1".to_string(),
            },
        )
        .await;

    let records = fx.store.records();
    assert_eq!(records.len(), 2);

    let grouped = records.iter().find(|r| r.event_id == Some(10)).unwrap();
    assert_eq!(grouped.feed_scope, FeedScope::Group);
    assert_eq!(grouped.group_id, Some(1));
    assert_eq!(grouped.aggregation_strategy, AggregationStrategy::TimeWindow);

    let standalone = records.iter().find(|r| r.event_id == Some(11)).unwrap();
    assert_eq!(standalone.feed_scope, FeedScope::Event);
    assert_eq!(standalone.group_id, None);
}

#[tokio::test]
async fn updates_stay_out_of_the_sitewide_feed() {
    let fx = fixture(
        vec![group(1, "open", ParentPrivacy::Public, 1)],
        vec![event(10, "in-group", ParentPrivacy::Public, Some(1))],
        vec![],
    );

    fx.router
        .handle(
            fx.tenant,
            &DomainEvent::GroupUpdated {
                group_slug: "open".to_string(),
            },
        )
        .await;
    fx.router
        .handle(
            fx.tenant,
            &DomainEvent::EventUpdated {
                event_slug: "in-group".to_string(),
            },
        )
        .await;

    let records = fx.store.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.feed_scope != FeedScope::Sitewide));
    assert!(records
        .iter()
        .all(|r| r.aggregation_strategy == AggregationStrategy::None));
}

#[tokio::test]
async fn milestone_fires_only_on_exact_threshold() {
    let fx = fixture(
        vec![
            group(1, "at-milestone", ParentPrivacy::Public, 25),
            group(2, "past-milestone", ParentPrivacy::Public, 26),
        ],
        vec![],
        vec![user("u1")],
    );

    for slug in ["at-milestone", "past-milestone"] {
        fx.router
            .handle(
                fx.tenant,
                &DomainEvent::MemberJoined {
                    group_slug: slug.to_string(),
                    user_id: "u1".to_string(),
                },
            )
            .await;
    }

    let records = fx.store.records();
    let milestones: Vec<_> = records
        .iter()
        .filter(|r| r.activity_type == activity_types::GROUP_MILESTONE)
        .collect();

    // Public group at an exact threshold: group-scoped plus sitewide.
    assert_eq!(milestones.len(), 2);
    assert!(milestones.iter().all(|r| r.group_id == Some(1)));
    assert!(milestones.iter().all(|r| r.metadata["milestone"] == 25));
    assert!(milestones
        .iter()
        .any(|r| r.feed_scope == FeedScope::Sitewide));
}

#[tokio::test]
async fn private_group_milestone_stays_in_the_group_feed() {
    let fx = fixture(
        vec![group(1, "closed", ParentPrivacy::Private, 10)],
        vec![],
        vec![user("u1")],
    );

    fx.router
        .handle(
            fx.tenant,
            &DomainEvent::MemberJoined {
                group_slug: "closed".to_string(),
                user_id: "u1".to_string(),
            },
        )
        .await;

    let milestones: Vec<_> = fx
        .store
        .records()
        .into_iter()
        .filter(|r| r.activity_type == activity_types::GROUP_MILESTONE)
        .collect();
    assert_eq!(milestones.len(), 1);
    assert_eq!(milestones[0].feed_scope, FeedScope::Group);
}

#[tokio::test]
async fn missing_parent_skips_the_fanout_without_failing() {
    let fx = fixture(vec![], vec![], vec![]);

    fx.router
        .handle(
            fx.tenant,
            &DomainEvent::MemberJoined {
                group_slug: "ghost".to_string(),
                user_id: "u1".to_string(),
            },
        )
        .await;
    fx.router
        .handle(
            fx.tenant,
            &DomainEvent::EventCreated {
                event_slug: "ghost".to_string(),
            },
        )
        .await;

    assert!(fx.store.records().is_empty());
}

#[tokio::test]
async fn unknown_user_degrades_to_a_bare_actor_id() {
    let fx = fixture(
        vec![group(42, "rustaceans", ParentPrivacy::Public, 5)],
        vec![],
        vec![], // no user records
    );

    fx.router
        .handle(
            fx.tenant,
            &DomainEvent::MemberJoined {
                group_slug: "rustaceans".to_string(),
                user_id: "u1".to_string(),
            },
        )
        .await;

    let records = fx.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].actor_id.as_deref(), Some("u1"));
    assert!(records[0].metadata.get("actor_slug").is_none());
}

#[tokio::test]
async fn duplicate_delivery_of_a_join_does_not_inflate_the_count() {
    let fx = fixture(
        vec![group(42, "rustaceans", ParentPrivacy::Public, 5)],
        vec![],
        vec![user("u1")],
    );

    for _ in 0..3 {
        fx.router
            .handle(
                fx.tenant,
                &DomainEvent::MemberJoined {
                    group_slug: "rustaceans".to_string(),
                    user_id: "u1".to_string(),
                },
            )
            .await;
    }

    let records = fx.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].aggregated_count, 1);
}

// --- branch isolation under storage failure ---

/// Store that rejects group-scoped writes, to prove one failing branch does
/// not stop the others.
struct GroupScopeFailingStore {
    inner: MemoryActivityStore,
}

#[async_trait]
impl ActivityStore for GroupScopeFailingStore {
    async fn insert(&self, tenant_id: Uuid, activity: NewActivity) -> Result<ActivityRecord> {
        if activity.feed_scope == FeedScope::Group {
            anyhow::bail!("write rejected");
        }
        self.inner.insert(tenant_id, activity).await
    }

    async fn find_fresh_by_key(
        &self,
        tenant_id: Uuid,
        key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<ActivityRecord>> {
        self.inner.find_fresh_by_key(tenant_id, key, cutoff).await
    }

    async fn merge_or_insert(
        &self,
        tenant_id: Uuid,
        activity: NewActivity,
    ) -> Result<ActivityRecord> {
        if activity.feed_scope == FeedScope::Group {
            anyhow::bail!("write rejected");
        }
        self.inner.merge_or_insert(tenant_id, activity).await
    }

    async fn query(&self, tenant_id: Uuid, query: &FeedQuery) -> Result<Vec<ActivityRecord>> {
        self.inner.query(tenant_id, query).await
    }

    async fn count(&self, tenant_id: Uuid, query: &FeedQuery) -> Result<i64> {
        self.inner.count(tenant_id, query).await
    }
}

#[tokio::test]
async fn a_failed_branch_does_not_stop_its_sibling() {
    let store = Arc::new(GroupScopeFailingStore {
        inner: MemoryActivityStore::new(),
    });
    let engine = AggregationEngine::new(store.clone());
    let router = FanoutRouter::new(
        engine,
        Arc::new(StubGroups(
            [(
                "secret-society".to_string(),
                group(42, "secret-society", ParentPrivacy::Private, 5),
            )]
            .into_iter()
            .collect(),
        )),
        Arc::new(StubEvents(HashMap::new())),
        Arc::new(StubUsers(HashMap::new())),
    );

    // The group-scoped write fails; the anonymized sitewide write lands.
    router
        .handle(
            Uuid::new_v4(),
            &DomainEvent::MemberJoined {
                group_slug: "secret-society".to_string(),
                user_id: "u1".to_string(),
            },
        )
        .await;

    let records = store.inner.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].feed_scope, FeedScope::Sitewide);
    assert_eq!(records[0].activity_type, activity_types::GROUP_ACTIVITY);
}
