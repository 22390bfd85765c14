//! Scoped feed reads plus actor display-name resolution.
//!
//! The reader applies the visibility set the caller computed from the
//! viewer's state; it performs no authentication itself. Name resolution is
//! best-effort: a failed or missing resolution falls back to the stored
//! `actor_name` metadata, then to the raw identity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::store::ActivityStore;
use crate::types::{ActivityRecord, FeedQuery};

/// Batched display-name resolution for federated actor identities.
///
/// The returned map may be partial; absent identities fall back downstream.
/// By convention a resolver that cannot do better returns the identity
/// itself as the display name.
#[async_trait]
pub trait ActorNameResolver: Send + Sync {
    async fn resolve(&self, identities: &[String]) -> Result<HashMap<String, String>>;
}

/// In-process cache in front of any resolver. An inner failure degrades to
/// whatever the cache already holds rather than failing the batch.
pub struct CachingNameResolver {
    inner: Arc<dyn ActorNameResolver>,
    cache: Mutex<HashMap<String, String>>,
}

impl CachingNameResolver {
    pub fn new(inner: Arc<dyn ActorNameResolver>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ActorNameResolver for CachingNameResolver {
    async fn resolve(&self, identities: &[String]) -> Result<HashMap<String, String>> {
        let mut hits = HashMap::new();
        let misses: Vec<String> = {
            let cache = self.cache.lock().unwrap();
            identities
                .iter()
                .filter(|id| {
                    if let Some(name) = cache.get(*id) {
                        hits.insert((*id).clone(), name.clone());
                        false
                    } else {
                        true
                    }
                })
                .cloned()
                .collect()
        };

        if misses.is_empty() {
            return Ok(hits);
        }

        match self.inner.resolve(&misses).await {
            Ok(resolved) => {
                let mut cache = self.cache.lock().unwrap();
                for (id, name) in &resolved {
                    cache.insert(id.clone(), name.clone());
                }
                hits.extend(resolved);
                Ok(hits)
            }
            Err(e) => {
                warn!(error = %e, misses = misses.len(), "name resolution failed, serving cached names only");
                Ok(hits)
            }
        }
    }
}

/// Read side of the feed.
pub struct FeedReader {
    store: Arc<dyn ActivityStore>,
    resolver: Arc<dyn ActorNameResolver>,
    max_page_size: i64,
}

impl FeedReader {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        resolver: Arc<dyn ActorNameResolver>,
        max_page_size: i64,
    ) -> Self {
        Self {
            store,
            resolver,
            max_page_size,
        }
    }

    /// Fetch one feed page, ordered by `updated_at` descending. The limit
    /// is clamped to the configured page-size cap.
    pub async fn fetch(&self, tenant_id: Uuid, query: FeedQuery) -> Result<Vec<ActivityRecord>> {
        let query = FeedQuery {
            limit: query.limit.clamp(0, self.max_page_size),
            offset: query.offset.max(0),
            ..query
        };
        self.store.query(tenant_id, &query).await
    }

    /// Total matching records, for pagination.
    pub async fn total(&self, tenant_id: Uuid, query: &FeedQuery) -> Result<i64> {
        self.store.count(tenant_id, query).await
    }

    /// Resolve display names for every distinct actor across `records`.
    ///
    /// Federated identities (containing `@`) go to the resolver in one
    /// batched call; local actors and resolution misses fall back to the
    /// record's stored `actor_name`, then to the raw identity.
    pub async fn resolve_actor_names(
        &self,
        records: &[ActivityRecord],
    ) -> HashMap<String, String> {
        let mut federated: Vec<String> = Vec::new();
        for record in records {
            if let Some(id) = &record.actor_id {
                if id.contains('@') && !federated.contains(id) {
                    federated.push(id.clone());
                }
            }
        }

        let resolved = if federated.is_empty() {
            HashMap::new()
        } else {
            match self.resolver.resolve(&federated).await {
                Ok(map) => map,
                Err(e) => {
                    warn!(error = %e, "actor name resolution unavailable, using stored names");
                    HashMap::new()
                }
            }
        };

        let mut names = HashMap::new();
        for record in records {
            let Some(id) = &record.actor_id else { continue };
            if names.contains_key(id) {
                continue;
            }
            let name = resolved
                .get(id)
                .cloned()
                .or_else(|| stored_actor_name(record))
                .unwrap_or_else(|| id.clone());
            names.insert(id.clone(), name);
        }
        names
    }
}

fn stored_actor_name(record: &ActivityRecord) -> Option<String> {
    record
        .metadata
        .get("actor_name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
