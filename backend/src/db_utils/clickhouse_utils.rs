//! ClickHouse-backed lookup tables: facet labels, outlier statistics and the
//! search response cache.

use async_trait::async_trait;
use clickhouse::Row;
use common::search_result::RecordOutlierStats;
use serde::{Deserialize, Serialize};

use crate::api::aggregation::outlier_stats::OutlierStatsSource;
use crate::cache::label_cache::{LabelSource, TermLabel};
use crate::config::SearchConfig;

pub fn get_clickhouse_client(config: &SearchConfig) -> clickhouse::Client {
    clickhouse::Client::default()
        .with_url(&config.clickhouse_url)
        .with_user(&config.clickhouse_user)
        .with_password(&config.clickhouse_password)
        .with_database(&config.clickhouse_database)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Row)]
struct TermLabelRow {
    term_field: String,
    term_value: String,
    term_label: String,
}

pub struct ClickhouseLabelSource {
    client: clickhouse::Client,
}

impl ClickhouseLabelSource {
    pub fn new(client: clickhouse::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LabelSource for ClickhouseLabelSource {
    async fn load_labels(&self) -> anyhow::Result<Vec<TermLabel>> {
        let sql = "
        SELECT term_field, term_value, term_label
        FROM facet_term_labels
        ";
        let rows = self.client.query(sql).fetch_all::<TermLabelRow>().await?;
        Ok(rows
            .into_iter()
            .map(|row| TermLabel { field: row.term_field, term: row.term_value, label: row.term_label })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Row)]
struct OutlierStatsRow {
    record_id: String,
    layer_id: String,
    record_layer_value: f64,
    sample_size: u64,
    min_value: f64,
    max_value: f64,
    mean_value: f64,
    std_dev: f64,
}

pub struct ClickhouseOutlierStats {
    client: clickhouse::Client,
}

impl ClickhouseOutlierStats {
    pub fn new(client: clickhouse::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OutlierStatsSource for ClickhouseOutlierStats {
    async fn outlier_stats(&self, record_id: &str) -> anyhow::Result<Vec<RecordOutlierStats>> {
        let sql = "
        SELECT record_id, layer_id, record_layer_value, sample_size, min_value, max_value, mean_value, std_dev
        FROM record_outlier_stats
        WHERE record_id = ?
        ORDER BY layer_id
        ";
        let rows = self.client.query(sql).bind(record_id).fetch_all::<OutlierStatsRow>().await?;
        Ok(rows
            .into_iter()
            .map(|row| RecordOutlierStats {
                record_id: row.record_id,
                layer_id: row.layer_id,
                record_layer_value: row.record_layer_value,
                sample_size: row.sample_size,
                min: row.min_value,
                max: row.max_value,
                mean: row.mean_value,
                std_dev: row.std_dev,
            })
            .collect())
    }
}

pub async fn get_cached_response(client: &clickhouse::Client, query_hash: &str, query_string: &str) -> anyhow::Result<String> {
    let sql = "
    SELECT result_json
    FROM search_index_cache
    WHERE query_hash = ?
      AND query_string = ?
    ORDER BY date_created DESC
    LIMIT 1
    ";
    let rows = client
        .query(sql)
        .bind(query_hash)
        .bind(query_string)
        .fetch_all::<String>()
        .await?;
    if let Some(result_json) = rows.into_iter().next() {
        Ok(result_json)
    } else {
        anyhow::bail!("Cache miss")
    }
}

pub async fn insert_cache(client: &clickhouse::Client, query_hash: &str, query_string: &str, response_txt: &str, dt_ms: u32) -> anyhow::Result<()> {
    let sql = "
    INSERT INTO search_index_cache (query_hash, query_string, result_json, duration_ms)
    VALUES (?, ?, ?, ?)
    ";
    client
        .query(sql)
        .bind(query_hash)
        .bind(query_string)
        .bind(response_txt)
        .bind(dt_ms)
        .execute()
        .await?;
    Ok(())
}
