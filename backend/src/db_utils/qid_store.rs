//! Saved query definitions referenced from free text as `qid:<id>`.

use async_trait::async_trait;
use common::search_query::{FilterClause, SpatialFilter};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredQuery {
    pub query: String,
    pub filters: Vec<FilterClause>,
    pub spatial: Option<SpatialFilter>,
}

#[async_trait]
pub trait QidStore: Send + Sync {
    async fn get(&self, qid: &str) -> anyhow::Result<Option<StoredQuery>>;
}

#[derive(Debug, Default)]
pub struct MemoryQidStore {
    entries: DashMap<String, StoredQuery>,
}

impl MemoryQidStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, qid: impl Into<String>, query: StoredQuery) {
        self.entries.insert(qid.into(), query);
    }
}

#[async_trait]
impl QidStore for MemoryQidStore {
    async fn get(&self, qid: &str) -> anyhow::Result<Option<StoredQuery>> {
        Ok(self.entries.get(qid).map(|entry| entry.value().clone()))
    }
}
