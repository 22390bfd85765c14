//! ActivityStore — the persistence seam for feed records.
//!
//! The Postgres implementation closes the concurrent-merge race with a
//! single conditional upsert: `merge_or_insert` either creates the window's
//! record or appends the actor, and the append guard re-checks actor
//! presence inside the statement. Two racing writers for the same key can
//! never double-count an actor or lose one.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use hearth_common::{AggregationStrategy, FeedScope, HearthError, Visibility};

use crate::types::{ActivityRecord, FeedQuery, NewActivity};

/// Persistence abstraction for activity records.
///
/// Implemented by [`PgActivityStore`] (production) and
/// [`crate::MemoryActivityStore`] (tests). Also implemented for `Arc<S>` so
/// a store can be shared with test assertions.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Insert a brand-new record unconditionally. Used for `none`-strategy
    /// activities, which never merge.
    async fn insert(&self, tenant_id: Uuid, activity: NewActivity) -> Result<ActivityRecord>;

    /// Find the open window for a key: a record with this aggregation key
    /// created after `cutoff`. A store timeout is an error, never `None`.
    async fn find_fresh_by_key(
        &self,
        tenant_id: Uuid,
        key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<ActivityRecord>>;

    /// Atomic insert-or-merge keyed on `(tenant_id, aggregation_key)`.
    ///
    /// If no record holds the key, inserts `activity` as-is. Otherwise
    /// appends `activity.actor_id` to the existing record's actor set —
    /// only when the actor is absent — bumping `aggregated_count` and
    /// `updated_at` on a real append and leaving the record untouched on a
    /// duplicate. Returns the post-merge record either way.
    async fn merge_or_insert(&self, tenant_id: Uuid, activity: NewActivity)
        -> Result<ActivityRecord>;

    /// Scoped, paginated, visibility-filtered read ordered by
    /// `updated_at DESC`.
    async fn query(&self, tenant_id: Uuid, query: &FeedQuery) -> Result<Vec<ActivityRecord>>;

    /// Total records matching `query`, ignoring limit/offset.
    async fn count(&self, tenant_id: Uuid, query: &FeedQuery) -> Result<i64>;
}

#[async_trait]
impl<S: ActivityStore + ?Sized> ActivityStore for Arc<S> {
    async fn insert(&self, tenant_id: Uuid, activity: NewActivity) -> Result<ActivityRecord> {
        (**self).insert(tenant_id, activity).await
    }

    async fn find_fresh_by_key(
        &self,
        tenant_id: Uuid,
        key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<ActivityRecord>> {
        (**self).find_fresh_by_key(tenant_id, key, cutoff).await
    }

    async fn merge_or_insert(
        &self,
        tenant_id: Uuid,
        activity: NewActivity,
    ) -> Result<ActivityRecord> {
        (**self).merge_or_insert(tenant_id, activity).await
    }

    async fn query(&self, tenant_id: Uuid, query: &FeedQuery) -> Result<Vec<ActivityRecord>> {
        (**self).query(tenant_id, query).await
    }

    async fn count(&self, tenant_id: Uuid, query: &FeedQuery) -> Result<i64> {
        (**self).count(tenant_id, query).await
    }
}

// ---------------------------------------------------------------------------
// PgActivityStore
// ---------------------------------------------------------------------------

const SELECT_COLUMNS: &str = "id, external_id, tenant_id, activity_type, feed_scope, \
     group_id, event_id, actor_id, actor_ids, visibility, metadata, \
     aggregation_key, aggregation_strategy, aggregated_count, created_at, updated_at";

/// Postgres-backed activity store.
#[derive(Clone)]
pub struct PgActivityStore {
    pool: PgPool,
}

impl PgActivityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent schema bootstrap. Safe to run at startup.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS activity_records (
                id                   BIGSERIAL    PRIMARY KEY,
                external_id          TEXT         NOT NULL UNIQUE,
                tenant_id            UUID         NOT NULL,
                activity_type        TEXT         NOT NULL,
                feed_scope           TEXT         NOT NULL,
                group_id             BIGINT,
                event_id             BIGINT,
                actor_id             TEXT,
                actor_ids            TEXT[]       NOT NULL DEFAULT '{}',
                visibility           TEXT         NOT NULL,
                metadata             JSONB        NOT NULL DEFAULT '{}',
                aggregation_key      TEXT,
                aggregation_strategy TEXT         NOT NULL DEFAULT 'none',
                aggregated_count     INTEGER      NOT NULL DEFAULT 1,
                created_at           TIMESTAMPTZ  NOT NULL,
                updated_at           TIMESTAMPTZ  NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Conflict target for the atomic merge.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS activity_records_tenant_agg_key
             ON activity_records (tenant_id, aggregation_key)
             WHERE aggregation_key IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;

        // Feed reads: scope + recency.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS activity_records_feed
             ON activity_records (tenant_id, feed_scope, updated_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ActivityStore for PgActivityStore {
    async fn insert(&self, tenant_id: Uuid, activity: NewActivity) -> Result<ActivityRecord> {
        let sql = format!(
            r#"
            INSERT INTO activity_records (
                external_id, tenant_id, activity_type, feed_scope, group_id, event_id,
                actor_id, actor_ids, visibility, metadata,
                aggregation_key, aggregation_strategy, aggregated_count,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 1, $13, $13)
            RETURNING {SELECT_COLUMNS}
            "#
        );

        let actor_ids: Vec<String> = activity.actor_id.clone().into_iter().collect();

        let record = sqlx::query_as::<_, ActivityRecord>(&sql)
            .bind(&activity.external_id)
            .bind(tenant_id)
            .bind(&activity.activity_type)
            .bind(activity.feed_scope.as_str())
            .bind(activity.group_id)
            .bind(activity.event_id)
            .bind(&activity.actor_id)
            .bind(&actor_ids)
            .bind(activity.visibility.as_str())
            .bind(&activity.metadata)
            .bind(&activity.aggregation_key)
            .bind(activity.aggregation_strategy.as_str())
            .bind(activity.created_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    async fn find_fresh_by_key(
        &self,
        tenant_id: Uuid,
        key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<ActivityRecord>> {
        // Window freshness is anchored to created_at, not updated_at: a
        // hot window must not stay open past its bucket through continual
        // merges.
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM activity_records
             WHERE tenant_id = $1 AND aggregation_key = $2 AND created_at > $3"
        );

        let record = sqlx::query_as::<_, ActivityRecord>(&sql)
            .bind(tenant_id)
            .bind(key)
            .bind(cutoff)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn merge_or_insert(
        &self,
        tenant_id: Uuid,
        activity: NewActivity,
    ) -> Result<ActivityRecord> {
        if activity.aggregation_key.is_none() {
            return Err(
                HearthError::Validation("merge_or_insert requires an aggregation key".into())
                    .into(),
            );
        }

        // The append guard runs inside the statement, so a racing read
        // cannot double-count: the row either gains the actor exactly once
        // or is returned unchanged.
        let sql = format!(
            r#"
            INSERT INTO activity_records (
                external_id, tenant_id, activity_type, feed_scope, group_id, event_id,
                actor_id, actor_ids, visibility, metadata,
                aggregation_key, aggregation_strategy, aggregated_count,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 1, $13, $13)
            ON CONFLICT (tenant_id, aggregation_key) WHERE aggregation_key IS NOT NULL
            DO UPDATE SET
                actor_id = CASE
                    WHEN $7::text IS NOT NULL
                         AND NOT (activity_records.actor_ids @> ARRAY[$7::text])
                        THEN $7::text
                    ELSE activity_records.actor_id
                END,
                actor_ids = CASE
                    WHEN $7::text IS NOT NULL
                         AND NOT (activity_records.actor_ids @> ARRAY[$7::text])
                        THEN activity_records.actor_ids || $7::text
                    ELSE activity_records.actor_ids
                END,
                aggregated_count = CASE
                    WHEN $7::text IS NOT NULL
                         AND NOT (activity_records.actor_ids @> ARRAY[$7::text])
                        THEN cardinality(activity_records.actor_ids) + 1
                    ELSE activity_records.aggregated_count
                END,
                updated_at = CASE
                    WHEN $7::text IS NOT NULL
                         AND NOT (activity_records.actor_ids @> ARRAY[$7::text])
                        THEN $13
                    ELSE activity_records.updated_at
                END
            RETURNING {SELECT_COLUMNS}
            "#
        );

        let actor_ids: Vec<String> = activity.actor_id.clone().into_iter().collect();

        let record = sqlx::query_as::<_, ActivityRecord>(&sql)
            .bind(&activity.external_id)
            .bind(tenant_id)
            .bind(&activity.activity_type)
            .bind(activity.feed_scope.as_str())
            .bind(activity.group_id)
            .bind(activity.event_id)
            .bind(&activity.actor_id)
            .bind(&actor_ids)
            .bind(activity.visibility.as_str())
            .bind(&activity.metadata)
            .bind(&activity.aggregation_key)
            .bind(activity.aggregation_strategy.as_str())
            .bind(activity.created_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    async fn query(&self, tenant_id: Uuid, query: &FeedQuery) -> Result<Vec<ActivityRecord>> {
        let sql = format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM activity_records
            WHERE tenant_id = $1
              AND feed_scope = $2
              AND ($3::bigint IS NULL OR group_id = $3)
              AND ($4::bigint IS NULL OR event_id = $4)
              AND ($5::text[] IS NULL OR visibility = ANY($5))
            ORDER BY updated_at DESC
            LIMIT $6 OFFSET $7
            "#
        );

        let records = sqlx::query_as::<_, ActivityRecord>(&sql)
            .bind(tenant_id)
            .bind(query.scope.as_str())
            .bind(query.group_id)
            .bind(query.event_id)
            .bind(visibility_filter(query))
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn count(&self, tenant_id: Uuid, query: &FeedQuery) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*) FROM activity_records
            WHERE tenant_id = $1
              AND feed_scope = $2
              AND ($3::bigint IS NULL OR group_id = $3)
              AND ($4::bigint IS NULL OR event_id = $4)
              AND ($5::text[] IS NULL OR visibility = ANY($5))
            "#,
        )
        .bind(tenant_id)
        .bind(query.scope.as_str())
        .bind(query.group_id)
        .bind(query.event_id)
        .bind(visibility_filter(query))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }
}

fn visibility_filter(query: &FeedQuery) -> Option<Vec<String>> {
    if query.visibility.is_empty() {
        None
    } else {
        Some(
            query
                .visibility
                .iter()
                .map(|v| v.as_str().to_string())
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// sqlx::FromRow for ActivityRecord
// ---------------------------------------------------------------------------

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ActivityRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;

        let feed_scope: String = row.try_get("feed_scope")?;
        let visibility: String = row.try_get("visibility")?;
        let aggregation_strategy: String = row.try_get("aggregation_strategy")?;

        Ok(ActivityRecord {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            tenant_id: row.try_get("tenant_id")?,
            activity_type: row.try_get("activity_type")?,
            feed_scope: FeedScope::parse_str(&feed_scope)
                .ok_or_else(|| decode_err("feed_scope", &feed_scope))?,
            group_id: row.try_get("group_id")?,
            event_id: row.try_get("event_id")?,
            actor_id: row.try_get("actor_id")?,
            actor_ids: row.try_get("actor_ids")?,
            visibility: Visibility::parse_str(&visibility)
                .ok_or_else(|| decode_err("visibility", &visibility))?,
            metadata: row.try_get("metadata")?,
            aggregation_key: row.try_get("aggregation_key")?,
            aggregation_strategy: AggregationStrategy::parse_str(&aggregation_strategy)
                .ok_or_else(|| decode_err("aggregation_strategy", &aggregation_strategy))?,
            aggregated_count: row.try_get("aggregated_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn decode_err(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unrecognized {column} label: {value}").into(),
    }
}
