//! Shared search query models and helpers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::search_result::FacetValue;

/// Free text that matches every record.
pub const MATCH_ALL: &str = "*:*";

/// Prefix marking a saved query reference in the free-text field.
pub const QID_PREFIX: &str = "qid:";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_longitude: f64,
    pub min_latitude: f64,
    pub max_longitude: f64,
    pub max_latitude: f64,
}

impl BoundingBox {
    pub fn new(min_longitude: f64, min_latitude: f64, max_longitude: f64, max_latitude: f64) -> Self {
        Self { min_longitude, min_latitude, max_longitude, max_latitude }
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_latitude
            && latitude <= self.max_latitude
            && longitude >= self.min_longitude
            && longitude <= self.max_longitude
    }

    pub fn width(&self) -> f64 {
        self.max_longitude - self.min_longitude
    }

    pub fn height(&self) -> f64 {
        self.max_latitude - self.min_latitude
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpatialFilter {
    Radius { latitude: f64, longitude: f64, radius_km: f64 },
    /// Closed ring of `(longitude, latitude)` vertices.
    Polygon { points: Vec<(f64, f64)> },
}

impl SpatialFilter {
    pub fn to_clause(&self) -> FilterClause {
        match self {
            SpatialFilter::Radius { latitude, longitude, radius_km } => FilterClause::Radius {
                latitude: *latitude,
                longitude: *longitude,
                radius_km: *radius_km,
            },
            SpatialFilter::Polygon { points } => FilterClause::Polygon { points: points.clone() },
        }
    }
}

/// One filter-query clause. Clauses are AND-ed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterClause {
    Term { field: String, value: FacetValue, negate: bool },
    AnyOf { field: String, values: BTreeSet<FacetValue> },
    /// `min` is inclusive, `max` inclusive only when `max_inclusive` is set.
    Range { field: String, min: Option<f64>, max: Option<f64>, max_inclusive: bool },
    Radius { latitude: f64, longitude: f64, radius_km: f64 },
    Polygon { points: Vec<(f64, f64)> },
    BoundingBox(BoundingBox),
    /// Matches records that match none of the inner clauses.
    NoneOf(Vec<FilterClause>),
    /// Pre-formed clause text in the free-text grammar.
    Raw(String),
}

impl FilterClause {
    pub fn term(field: impl Into<String>, value: impl Into<FacetValue>) -> Self {
        FilterClause::Term { field: field.into(), value: value.into(), negate: false }
    }

    pub fn not_term(field: impl Into<String>, value: impl Into<FacetValue>) -> Self {
        FilterClause::Term { field: field.into(), value: value.into(), negate: true }
    }

    pub fn range(field: impl Into<String>, min: Option<f64>, max: Option<f64>, max_inclusive: bool) -> Self {
        FilterClause::Range { field: field.into(), min, max, max_inclusive }
    }

    /// Number of boolean clauses this filter expands to in the index.
    pub fn clause_cost(&self) -> usize {
        match self {
            FilterClause::AnyOf { values, .. } => values.len().max(1),
            FilterClause::NoneOf(clauses) => clauses.iter().map(FilterClause::clause_cost).sum::<usize>().max(1),
            FilterClause::Raw(text) => text.split_whitespace().filter(|t| !is_operator(t)).count().max(1),
            _ => 1,
        }
    }
}

fn is_operator(token: &str) -> bool {
    matches!(token, "AND" | "OR" | "NOT" | "&&" | "||")
}

/// Number of boolean clauses in a free-text query.
pub fn free_text_clause_cost(query: &str) -> usize {
    let query = query.trim();
    if query.is_empty() || query == MATCH_ALL {
        return 0;
    }
    query.split_whitespace().filter(|t| !is_operator(t)).count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FacetSort {
    #[default]
    Count,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub query: String,
    pub filters: Vec<FilterClause>,
    pub spatial: Option<SpatialFilter>,
    pub start: u64,
    pub page_size: u64,
    pub facets: Vec<String>,
    /// `None` falls back to the configured default; negative means unlimited.
    pub facet_limit: Option<i64>,
    pub facet_sort: Option<FacetSort>,
    /// Group count for grouped facets.
    pub flimit: Option<u64>,
    pub sort: Option<String>,
    pub dir: SortDirection,
    pub include_sensitive: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: MATCH_ALL.to_string(),
            filters: Vec::new(),
            spatial: None,
            start: 0,
            page_size: crate::search_const::PAGE_SIZE,
            facets: Vec::new(),
            facet_limit: None,
            facet_sort: None,
            flimit: None,
            sort: None,
            dir: SortDirection::Asc,
            include_sensitive: false,
        }
    }
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Default::default() }
    }

    pub fn with_filter(mut self, clause: FilterClause) -> Self {
        self.filters.push(clause);
        self
    }

    pub fn with_facets<I, S>(mut self, facets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.facets = facets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_radius(mut self, latitude: f64, longitude: f64, radius_km: f64) -> Self {
        self.spatial = Some(SpatialFilter::Radius { latitude, longitude, radius_km });
        self
    }

    /// The saved query id when the free text is a `qid:` reference.
    pub fn query_id(&self) -> Option<&str> {
        self.query.trim().strip_prefix(QID_PREFIX).map(str::trim).filter(|qid| !qid.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DownloadFormat {
    #[default]
    Csv,
    Tsv,
}

impl DownloadFormat {
    pub fn delimiter(&self) -> u8 {
        match self {
            DownloadFormat::Csv => b',',
            DownloadFormat::Tsv => b'\t',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RecordCapPolicy {
    pub max_total: Option<u64>,
    pub max_per_source: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DownloadRequest {
    pub search: SearchRequest,
    pub fields: Vec<String>,
    pub format: DownloadFormat,
    pub record_cap: RecordCapPolicy,
}

impl DownloadRequest {
    pub fn new(search: SearchRequest, fields: Vec<String>) -> Self {
        Self { search, fields, ..Default::default() }
    }
}
