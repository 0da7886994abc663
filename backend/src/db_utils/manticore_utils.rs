use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;

use async_trait::async_trait;
use common::search_result::{Document, FacetItem, FacetResult, FacetValue, FieldValue, ResultPage};

use crate::api::search::search_sql::{build_count_sql, build_select_sql, build_stats_sql};
use crate::config::SearchConfig;
use crate::db_utils::clickhouse_utils::{get_cached_response, get_clickhouse_client, insert_cache};
use crate::db_utils::index_client::{FieldStats, IndexClient, IndexQuery};
use crate::error::SearchError;

#[derive(Debug, Serialize, Deserialize)]
pub struct RawSearchResult<T> {
    pub hits: RawSearchResultHits<T>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub took: u64,
    pub aggregations: Option<BTreeMap<String, RawSearchResultAggregation>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RawSearchResultHits<T> {
    pub hits: Vec<RawSearchResultHit<T>>,
    pub total: u64,
    #[serde(default)]
    pub total_relation: String,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct RawSearchResultAggregation {
    pub buckets: Vec<RawSearchResultAggregationBucket>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RawSearchResultAggregationBucket {
    pub key: serde_json::Value,
    pub doc_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RawSearchResultHit<T> {
    pub _source: T,
    #[serde(default)]
    pub _score: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CountRow {
    total_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatsRow {
    count: u64,
    min_value: Option<f64>,
    max_value: Option<f64>,
    sum_value: Option<f64>,
}

/// Index adapter speaking Manticore SQL over HTTP.
pub struct ManticoreIndexClient {
    http: reqwest::Client,
    sql_url: String,
    table: String,
    max_clause_count: usize,
    response_cache: Option<clickhouse::Client>,
}

impl ManticoreIndexClient {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            sql_url: format!("{}/sql", config.manticore_url.trim_end_matches('/')),
            table: config.manticore_table.clone(),
            max_clause_count: config.max_clause_count_fallback,
            response_cache: config.cache_responses.then(|| get_clickhouse_client(config)),
        }
    }

    pub async fn manticore_search_sql<T: DeserializeOwned + std::fmt::Debug>(
        &self,
        sql: String,
    ) -> anyhow::Result<RawSearchResult<T>> {
        let query_hash = sha256::digest(sql.clone());
        if let Some(cache) = &self.response_cache {
            if let Ok(cached_response) = get_cached_response(cache, &query_hash, &sql).await {
                if let Ok(response) = serde_json::from_str::<RawSearchResult<T>>(&cached_response) {
                    tracing::debug!("SEARCH CACHE HIT: {}", query_hash);
                    return Ok(response);
                }
            }
            tracing::debug!("SEARCH CACHE MISS: {}", query_hash);
        }
        let t0 = std::time::Instant::now();
        let response = self
            .http
            .post(&self.sql_url)
            .body(sql.clone())
            .send()
            .await
            .map_err(|e| SearchError::index_unavailable(e))?;
        let status = response.status();
        let response_txt = response.text().await.map_err(|e| SearchError::index_unavailable(e))?;
        if status.is_server_error() {
            return Err(SearchError::index_unavailable(format!("{}: {}", status, response_txt)).into());
        }
        if status.is_client_error() {
            return Err(SearchError::invalid_request(format!("{}: {}", status, response_txt)).into());
        }
        let dt_ms = t0.elapsed().as_millis() as u32;
        tracing::debug!("SEARCH RESPONSE: len = {} ({}ms)", response_txt.len(), dt_ms);
        if let Some(cache) = &self.response_cache {
            if insert_cache(cache, &query_hash, &sql, &response_txt, dt_ms).await.is_ok() {
                tracing::debug!("SEARCH CACHE INSERTED: {} (searched in {}ms)", query_hash, dt_ms);
            } else {
                tracing::warn!("SEARCH CACHE INSERT FAILED: {}", query_hash);
            }
        }
        let response: RawSearchResult<T> = serde_json::from_str(&response_txt)?;
        if response.timed_out {
            return Err(SearchError::index_unavailable("query timed out").into());
        }
        Ok(response)
    }

    async fn count(&self, query: &IndexQuery) -> anyhow::Result<u64> {
        let sql = build_count_sql(query, &self.table)?;
        let response = self.manticore_search_sql::<CountRow>(sql).await?;
        Ok(response.hits.hits.first().map_or(0, |hit| hit._source.total_count))
    }
}

#[async_trait]
impl IndexClient for ManticoreIndexClient {
    async fn execute(&self, query: &IndexQuery) -> anyhow::Result<ResultPage> {
        if query.rows == 0 && query.facet.fields.is_empty() {
            let total = self.count(query).await?;
            return Ok(ResultPage { documents: Vec::new(), total, facets: Vec::new() });
        }
        let sql = build_select_sql(query, &self.table)?;
        let response = self.manticore_search_sql::<serde_json::Map<String, serde_json::Value>>(sql).await?;
        let total = response.hits.total;
        let documents = response.hits.hits.into_iter().map(|hit| document_from_source(hit._source)).collect();
        let aggregations = response.aggregations.unwrap_or_default();
        let mut facets = Vec::new();
        for field in &query.facet.fields {
            let buckets = aggregations.get(field).map(|a| a.buckets.clone()).unwrap_or_default();
            facets.push(facet_from_buckets(field, buckets, query.facet.min_count)?);
        }
        Ok(ResultPage { documents, total, facets })
    }

    async fn field_stats(&self, query: &IndexQuery, field: &str) -> anyhow::Result<Option<FieldStats>> {
        let sql = build_stats_sql(query, &self.table, field)?;
        let response = self.manticore_search_sql::<StatsRow>(sql).await?;
        let Some(hit) = response.hits.hits.into_iter().next() else {
            return Ok(None);
        };
        let row = hit._source;
        match (row.min_value, row.max_value) {
            (Some(min), Some(max)) if row.count > 0 => Ok(Some(FieldStats {
                count: row.count,
                min,
                max,
                sum: row.sum_value.unwrap_or(0.0),
            })),
            _ => Ok(None),
        }
    }

    async fn max_clause_count(&self) -> anyhow::Result<usize> {
        Ok(self.max_clause_count)
    }
}

fn facet_from_buckets(field: &str, buckets: Vec<RawSearchResultAggregationBucket>, min_count: u64) -> anyhow::Result<FacetResult> {
    let mut result = FacetResult::new(field);
    for bucket in buckets {
        if bucket.doc_count < min_count.max(1) {
            continue;
        }
        let value = match &bucket.key {
            serde_json::Value::String(s) => FacetValue::String(s.clone()),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FacetValue::Int(i),
                None => FacetValue::String(n.to_string()),
            },
            _ => anyhow::bail!("Invalid value from manticore related to facets: {:#?}", bucket.key),
        };
        result.facet_values.push(FacetItem::new(value, bucket.doc_count));
    }
    Ok(result)
}

fn field_value_from_json(value: serde_json::Value) -> Option<FieldValue> {
    match value {
        serde_json::Value::String(s) => Some(FieldValue::Str(s)),
        serde_json::Value::Bool(b) => Some(FieldValue::Bool(b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(FieldValue::Int(i)),
            None => n.as_f64().map(FieldValue::Float),
        },
        serde_json::Value::Array(items) => {
            Some(FieldValue::List(items.into_iter().filter_map(field_value_from_json).collect()))
        }
        serde_json::Value::Null | serde_json::Value::Object(_) => None,
    }
}

pub fn document_from_source(source: serde_json::Map<String, serde_json::Value>) -> Document {
    let mut document = Document::default();
    for (field, value) in source {
        if let Some(value) = field_value_from_json(value) {
            document.set(&field, value);
        }
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_maps_typed_and_extra_fields() {
        let source = serde_json::json!({
            "id": 42,
            "data_resource_uid": "dr376",
            "latitude": -33.8,
            "longitude": 151.2,
            "year": 1998,
            "genus": "Macropus",
            "state": null,
        });
        let serde_json::Value::Object(source) = source else { unreachable!() };
        let doc = document_from_source(source);
        assert_eq!(doc.id, "42");
        assert_eq!(doc.data_source_id, "dr376");
        assert_eq!(doc.latitude, Some(-33.8));
        assert_eq!(doc.year, Some(1998));
        assert_eq!(doc.extra.get("genus"), Some(&FieldValue::Str("Macropus".to_string())));
        assert!(!doc.extra.contains_key("state"));
    }

    #[test]
    fn buckets_below_min_count_are_dropped() {
        let buckets = vec![
            RawSearchResultAggregationBucket { key: serde_json::json!("NSW"), doc_count: 5 },
            RawSearchResultAggregationBucket { key: serde_json::json!(2001), doc_count: 1 },
        ];
        let facet = facet_from_buckets("state", buckets, 2).unwrap();
        assert_eq!(facet.facet_values.len(), 1);
        assert_eq!(facet.facet_values[0].original_value, FacetValue::String("NSW".to_string()));
    }
}
