//! The index seen by the rest of the backend: an executable query object and the
//! capability set every index adapter provides.

use std::collections::BTreeMap;

use async_trait::async_trait;
use common::search_query::{FacetSort, FilterClause, SortDirection, free_text_clause_cost};
use common::search_result::{Document, FacetResult, ResultPage};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetOptions {
    pub fields: Vec<String>,
    /// Negative means unlimited.
    pub limit: i64,
    pub min_count: u64,
    pub sort: FacetSort,
    pub offset: u64,
}

impl Default for FacetOptions {
    fn default() -> Self {
        Self { fields: Vec::new(), limit: 30, min_count: 1, sort: FacetSort::Count, offset: 0 }
    }
}

impl FacetOptions {
    pub fn single(field: impl Into<String>, limit: i64) -> Self {
        Self { fields: vec![field.into()], limit, ..Default::default() }
    }

    pub fn limit(&self) -> Option<usize> {
        usize::try_from(self.limit).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IndexQuery {
    pub query: String,
    pub filters: Vec<FilterClause>,
    pub start: u64,
    pub rows: u64,
    pub sort: Option<(String, SortDirection)>,
    /// Empty means every stored field.
    pub fields: Vec<String>,
    pub facet: FacetOptions,
    /// Raw parameters without a structured counterpart.
    pub params: BTreeMap<String, Vec<String>>,
}

impl IndexQuery {
    pub fn clause_count(&self) -> usize {
        free_text_clause_cost(&self.query) + self.filters.iter().map(|f| f.clause_cost()).sum::<usize>()
    }

    /// Same selection, no rows and no facets.
    pub fn count_only(&self) -> Self {
        Self { start: 0, rows: 0, facet: FacetOptions { fields: Vec::new(), ..self.facet.clone() }, ..self.clone() }
    }

    /// Same selection, no rows, a single facet.
    pub fn facet_only(&self, field: &str, limit: i64) -> Self {
        Self {
            start: 0,
            rows: 0,
            facet: FacetOptions { fields: vec![field.to_string()], limit, offset: 0, ..self.facet.clone() },
            ..self.clone()
        }
    }

    pub fn with_filter(mut self, clause: FilterClause) -> Self {
        self.filters.push(clause);
        self
    }

    pub fn page(&self, start: u64, rows: u64) -> Self {
        Self { start, rows, facet: FacetOptions { fields: Vec::new(), ..self.facet.clone() }, ..self.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

impl FieldStats {
    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.sum / self.count as f64 }
    }
}

#[async_trait]
pub trait IndexClient: Send + Sync {
    /// One page of documents, the total match count and any requested facets.
    async fn execute(&self, query: &IndexQuery) -> anyhow::Result<ResultPage>;

    async fn execute_facets(&self, query: &IndexQuery) -> anyhow::Result<Vec<FacetResult>> {
        let query = IndexQuery { rows: 0, ..query.clone() };
        Ok(self.execute(&query).await?.facets)
    }

    /// Numeric statistics of `field` over matching documents; `None` when no
    /// document carries a value.
    async fn field_stats(&self, query: &IndexQuery, field: &str) -> anyhow::Result<Option<FieldStats>>;

    /// Maximum number of boolean clauses one query may carry.
    async fn max_clause_count(&self) -> anyhow::Result<usize>;

    /// Every document matching `query` from `query.start`, fetched lazily in
    /// pages of `page_size`. The stream ends after the first error.
    fn execute_streaming<'a>(&'a self, query: &'a IndexQuery, page_size: u64) -> BoxStream<'a, anyhow::Result<Document>> {
        let page_size = page_size.max(1);
        stream::unfold(Some(query.start), move |next| async move {
            let start = next?;
            match self.execute(&query.page(start, page_size)).await {
                Ok(page) => {
                    let fetched = page.documents.len() as u64;
                    let next = if fetched < page_size || start + fetched >= page.total { None } else { Some(start + fetched) };
                    let items = page.documents.into_iter().map(Ok).collect::<Vec<_>>();
                    Some((stream::iter(items), next))
                }
                Err(e) => Some((stream::iter(vec![Err(e)]), None)),
            }
        })
        .flatten()
        .boxed()
    }
}
