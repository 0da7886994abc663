//! Collaborators shared by every search operation.

use std::sync::Arc;

use crate::api::aggregation::outlier_stats::{NoOutlierStats, OutlierStatsSource};
use crate::cache::label_cache::LabelCache;
use crate::config::SearchConfig;
use crate::db_utils::clickhouse_utils::{ClickhouseLabelSource, ClickhouseOutlierStats, get_clickhouse_client};
use crate::db_utils::index_client::IndexClient;
use crate::db_utils::manticore_utils::ManticoreIndexClient;
use crate::db_utils::qid_store::{MemoryQidStore, QidStore};

#[derive(Clone)]
pub struct SearchContext {
    pub config: Arc<SearchConfig>,
    pub index: Arc<dyn IndexClient>,
    pub qid_store: Arc<dyn QidStore>,
    pub labels: LabelCache,
    pub outliers: Arc<dyn OutlierStatsSource>,
}

impl SearchContext {
    pub fn new(config: SearchConfig, index: Arc<dyn IndexClient>) -> Self {
        Self {
            config: Arc::new(config),
            index,
            qid_store: Arc::new(MemoryQidStore::new()),
            labels: LabelCache::empty(),
            outliers: Arc::new(NoOutlierStats),
        }
    }

    /// Manticore index with ClickHouse label and outlier tables, as configured
    /// by the environment.
    pub async fn from_env() -> anyhow::Result<Self> {
        let config = SearchConfig::from_env();
        let clickhouse = get_clickhouse_client(&config);
        let index = Arc::new(ManticoreIndexClient::new(&config));
        let labels = LabelCache::new(Arc::new(ClickhouseLabelSource::new(clickhouse.clone())));
        if let Err(e) = labels.refresh().await {
            tracing::warn!("starting with an empty label cache: {:#}", e);
        }
        Ok(Self::new(config, index)
            .with_labels(labels)
            .with_outliers(Arc::new(ClickhouseOutlierStats::new(clickhouse))))
    }

    pub fn with_qid_store(mut self, qid_store: Arc<dyn QidStore>) -> Self {
        self.qid_store = qid_store;
        self
    }

    pub fn with_labels(mut self, labels: LabelCache) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_outliers(mut self, outliers: Arc<dyn OutlierStatsSource>) -> Self {
        self.outliers = outliers;
        self
    }
}
