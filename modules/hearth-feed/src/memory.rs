//! In-memory activity store for tests. No database required.
//!
//! All mutation happens under one mutex, so `merge_or_insert` is atomic by
//! construction and the store honors the same no-lost-actors guarantee as
//! the Postgres conditional upsert.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::store::ActivityStore;
use crate::types::{ActivityRecord, FeedQuery, NewActivity};

#[derive(Default)]
pub struct MemoryActivityStore {
    next_id: AtomicI64,
    records: Mutex<Vec<ActivityRecord>>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of all records (for test assertions).
    pub fn records(&self) -> Vec<ActivityRecord> {
        self.records.lock().unwrap().clone()
    }

    fn materialize(&self, tenant_id: Uuid, activity: NewActivity) -> ActivityRecord {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        ActivityRecord {
            id,
            external_id: activity.external_id,
            tenant_id,
            activity_type: activity.activity_type,
            feed_scope: activity.feed_scope,
            group_id: activity.group_id,
            event_id: activity.event_id,
            actor_ids: activity.actor_id.clone().into_iter().collect(),
            actor_id: activity.actor_id,
            visibility: activity.visibility,
            metadata: activity.metadata,
            aggregation_key: activity.aggregation_key,
            aggregation_strategy: activity.aggregation_strategy,
            aggregated_count: 1,
            created_at: activity.created_at,
            updated_at: activity.created_at,
        }
    }
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn insert(&self, tenant_id: Uuid, activity: NewActivity) -> Result<ActivityRecord> {
        let record = self.materialize(tenant_id, activity);
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn find_fresh_by_key(
        &self,
        tenant_id: Uuid,
        key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<ActivityRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .find(|r| {
                r.tenant_id == tenant_id
                    && r.aggregation_key.as_deref() == Some(key)
                    && r.created_at > cutoff
            })
            .cloned())
    }

    async fn merge_or_insert(
        &self,
        tenant_id: Uuid,
        activity: NewActivity,
    ) -> Result<ActivityRecord> {
        let key = activity
            .aggregation_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("merge_or_insert requires an aggregation key"))?;

        let mut records = self.records.lock().unwrap();

        if let Some(existing) = records
            .iter_mut()
            .find(|r| r.tenant_id == tenant_id && r.aggregation_key.as_deref() == Some(&key))
        {
            if let Some(actor) = activity.actor_id {
                if !existing.has_actor(&actor) {
                    existing.actor_ids.push(actor.clone());
                    existing.actor_id = Some(actor);
                    existing.aggregated_count = existing.actor_ids.len() as i32;
                    existing.updated_at = activity.created_at;
                }
            }
            return Ok(existing.clone());
        }

        let record = self.materialize(tenant_id, activity);
        records.push(record.clone());
        Ok(record)
    }

    async fn query(&self, tenant_id: Uuid, query: &FeedQuery) -> Result<Vec<ActivityRecord>> {
        let records = self.records.lock().unwrap();
        let mut matched: Vec<ActivityRecord> = records
            .iter()
            .filter(|r| matches_query(r, tenant_id, query))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(matched
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect())
    }

    async fn count(&self, tenant_id: Uuid, query: &FeedQuery) -> Result<i64> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| matches_query(r, tenant_id, query))
            .count() as i64)
    }
}

fn matches_query(record: &ActivityRecord, tenant_id: Uuid, query: &FeedQuery) -> bool {
    record.tenant_id == tenant_id
        && record.feed_scope == query.scope
        && query.group_id.map_or(true, |g| record.group_id == Some(g))
        && query.event_id.map_or(true, |e| record.event_id == Some(e))
        && (query.visibility.is_empty() || query.visibility.contains(&record.visibility))
}
