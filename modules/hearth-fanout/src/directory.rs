//! Lookup seams for parent entities. The platform's group/event/user
//! services implement these; the router only needs get-by-slug/id.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use hearth_common::ParentPrivacy;

#[derive(Debug, Clone)]
pub struct GroupRecord {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub privacy: ParentPrivacy,
    /// Current member count, read at call time. Not transactional.
    pub member_count: i64,
}

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub privacy: ParentPrivacy,
    /// `None` for standalone events.
    pub group_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub slug: String,
    pub display_name: String,
}

#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn group_by_slug(&self, tenant_id: Uuid, slug: &str) -> Result<Option<GroupRecord>>;
    async fn group_by_id(&self, tenant_id: Uuid, id: i64) -> Result<Option<GroupRecord>>;
}

#[async_trait]
pub trait EventDirectory: Send + Sync {
    async fn event_by_slug(&self, tenant_id: Uuid, slug: &str) -> Result<Option<EventRecord>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_by_id(&self, tenant_id: Uuid, id: &str) -> Result<Option<UserRecord>>;
}
