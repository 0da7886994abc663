//! Precomputed environmental outlier statistics per record.

use async_trait::async_trait;
use common::search_result::RecordOutlierStats;
use dashmap::DashMap;

use crate::context::SearchContext;

#[async_trait]
pub trait OutlierStatsSource: Send + Sync {
    async fn outlier_stats(&self, record_id: &str) -> anyhow::Result<Vec<RecordOutlierStats>>;
}

/// Source without any statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOutlierStats;

#[async_trait]
impl OutlierStatsSource for NoOutlierStats {
    async fn outlier_stats(&self, _record_id: &str) -> anyhow::Result<Vec<RecordOutlierStats>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Default)]
pub struct MemoryOutlierStats {
    by_record: DashMap<String, Vec<RecordOutlierStats>>,
}

impl MemoryOutlierStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, stats: RecordOutlierStats) {
        self.by_record.entry(stats.record_id.clone()).or_default().push(stats);
    }
}

#[async_trait]
impl OutlierStatsSource for MemoryOutlierStats {
    async fn outlier_stats(&self, record_id: &str) -> anyhow::Result<Vec<RecordOutlierStats>> {
        Ok(self.by_record.get(record_id).map(|s| s.value().clone()).unwrap_or_default())
    }
}

/// Outlier statistics of a record; empty when the record has none.
pub async fn outlier_stats_for(ctx: &SearchContext, record_id: &str) -> anyhow::Result<Vec<RecordOutlierStats>> {
    let record_id = record_id.trim();
    if record_id.is_empty() {
        return Ok(Vec::new());
    }
    ctx.outliers.outlier_stats(record_id).await
}
