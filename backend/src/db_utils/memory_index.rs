//! In-process index over a vector of documents.
//!
//! Evaluates the same query objects as the Manticore adapter, in index order
//! (insertion order unless a sort is requested). Page fetches can be delayed or
//! made to fail to exercise the download path.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use common::search_query::{FacetSort, FilterClause, MATCH_ALL, SortDirection};
use common::search_result::{Document, FacetItem, FacetResult, FacetValue, FieldValue, ResultPage};
use parking_lot::{Mutex, RwLock};

use crate::db_utils::index_client::{FieldStats, IndexClient, IndexQuery};
use crate::error::SearchError;

const EARTH_RADIUS_KM: f64 = 6371.0088;

pub struct MemoryIndex {
    documents: RwLock<Vec<Document>>,
    max_clause_count: usize,
    /// Remaining injected failures per page start offset.
    failures: Mutex<HashMap<u64, u32>>,
    count_failures: Mutex<u32>,
    delays: Mutex<HashMap<u64, Duration>>,
    executed: Mutex<Vec<IndexQuery>>,
}

impl MemoryIndex {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: RwLock::new(documents),
            max_clause_count: 1024,
            failures: Mutex::new(HashMap::new()),
            count_failures: Mutex::new(0),
            delays: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_max_clause_count(mut self, max_clause_count: usize) -> Self {
        self.max_clause_count = max_clause_count;
        self
    }

    pub fn add(&self, document: Document) {
        self.documents.write().push(document);
    }

    /// The page fetch starting at `start` fails `times` times with `IndexUnavailable`.
    pub fn fail_page(&self, start: u64, times: u32) {
        self.failures.lock().insert(start, times);
    }

    /// The next `times` count-only queries fail with `IndexUnavailable`.
    pub fn fail_counts(&self, times: u32) {
        *self.count_failures.lock() = times;
    }

    pub fn delay_page(&self, start: u64, delay: Duration) {
        self.delays.lock().insert(start, delay);
    }

    pub fn executed_queries(&self) -> Vec<IndexQuery> {
        self.executed.lock().clone()
    }

    /// Queries that asked for documents, failed attempts included.
    pub fn page_fetches(&self) -> Vec<IndexQuery> {
        self.executed.lock().iter().filter(|q| q.rows > 0).cloned().collect()
    }

    fn matching(&self, query: &IndexQuery) -> Vec<Document> {
        let terms = parse_text(&query.query);
        let documents = self.documents.read();
        let mut matched = documents
            .iter()
            .filter(|doc| terms.iter().all(|t| t.matches(doc)) && query.filters.iter().all(|f| filter_matches(f, doc)))
            .cloned()
            .collect::<Vec<_>>();
        if let Some((field, dir)) = &query.sort {
            matched.sort_by(|a, b| {
                let ordering = compare_values(a.get(field).as_ref(), b.get(field).as_ref());
                match dir {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }
        matched
    }

    async fn before_execute(&self, query: &IndexQuery) -> anyhow::Result<()> {
        self.executed.lock().push(query.clone());
        if query.rows == 0 {
            if query.facet.fields.is_empty() {
                let mut remaining = self.count_failures.lock();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SearchError::index_unavailable("injected count failure").into());
                }
            }
            return Ok(());
        }
        let delay = self.delays.lock().get(&query.start).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut failures = self.failures.lock();
        if let Some(remaining) = failures.get_mut(&query.start) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SearchError::index_unavailable(format!("injected failure at offset {}", query.start)).into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IndexClient for MemoryIndex {
    async fn execute(&self, query: &IndexQuery) -> anyhow::Result<ResultPage> {
        self.before_execute(query).await?;
        let matched = self.matching(query);
        let facets = query
            .facet
            .fields
            .iter()
            .map(|field| facet_counts(&matched, field, query))
            .collect();
        let total = matched.len() as u64;
        let documents = matched
            .into_iter()
            .skip(query.start as usize)
            .take(query.rows as usize)
            .map(|doc| project(doc, &query.fields))
            .collect();
        Ok(ResultPage { documents, total, facets })
    }

    async fn field_stats(&self, query: &IndexQuery, field: &str) -> anyhow::Result<Option<FieldStats>> {
        self.before_execute(query).await?;
        let mut stats: Option<FieldStats> = None;
        for doc in self.matching(query) {
            let Some(value) = doc.get(field).and_then(|v| v.as_f64()) else {
                continue;
            };
            let s = stats.get_or_insert(FieldStats { count: 0, min: value, max: value, sum: 0.0 });
            s.count += 1;
            s.min = s.min.min(value);
            s.max = s.max.max(value);
            s.sum += value;
        }
        Ok(stats)
    }

    async fn max_clause_count(&self) -> anyhow::Result<usize> {
        Ok(self.max_clause_count)
    }
}

fn project(doc: Document, fields: &[String]) -> Document {
    if fields.is_empty() {
        return doc;
    }
    let mut projected = Document::new(doc.id.clone(), doc.data_source_id.clone());
    for field in fields {
        if let Some(value) = doc.get(field) {
            projected.set(field, value);
        }
    }
    projected
}

fn facet_counts(matched: &[Document], field: &str, query: &IndexQuery) -> FacetResult {
    let mut counts: BTreeMap<FacetValue, u64> = BTreeMap::new();
    for doc in matched {
        let values = doc.get(field).map(|v| v.facet_values()).unwrap_or_default();
        for value in values.into_iter().collect::<BTreeSet<_>>() {
            *counts.entry(value).or_default() += 1;
        }
    }
    let mut values = counts.into_iter().filter(|(_, c)| *c >= query.facet.min_count.max(1)).collect::<Vec<_>>();
    if query.facet.sort == FacetSort::Count {
        values.sort_by(|(va, ca), (vb, cb)| cb.cmp(ca).then_with(|| va.cmp(vb)));
    }
    let limit = query.facet.limit().unwrap_or(usize::MAX);
    FacetResult {
        facet_field: field.to_string(),
        facet_values: values
            .into_iter()
            .skip(query.facet.offset as usize)
            .take(limit)
            .map(|(value, count)| FacetItem::new(value, count))
            .collect(),
    }
}

fn compare_values(a: Option<&FieldValue>, b: Option<&FieldValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_text().cmp(&b.to_text()),
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TextTerm {
    All,
    Field { field: String, value: String, negate: bool },
    Word { word: String, negate: bool },
}

impl TextTerm {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            TextTerm::All => true,
            TextTerm::Field { field, value, negate } => {
                let found = match doc.get(field) {
                    Some(_) if value == "*" => true,
                    Some(v) => v.matches(&FacetValue::String(value.clone())),
                    None => false,
                };
                found != *negate
            }
            TextTerm::Word { word, negate } => {
                let word = word.to_lowercase();
                let mut texts = doc.scientific_name.iter().cloned().collect::<Vec<_>>();
                texts.extend(doc.extra.values().filter(|v| matches!(v, FieldValue::Str(_) | FieldValue::List(_))).map(|v| v.to_text()));
                let found = texts.iter().any(|t| t.to_lowercase().contains(&word));
                found != *negate
            }
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in text.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_text(text: &str) -> Vec<TextTerm> {
    let text = text.trim();
    if text.is_empty() || text == MATCH_ALL {
        return vec![TextTerm::All];
    }
    tokenize(text)
        .into_iter()
        .filter(|t| !matches!(t.as_str(), "AND" | "OR" | "&&" | "||"))
        .map(|token| {
            if token == MATCH_ALL {
                return TextTerm::All;
            }
            let (negate, token) = match token.strip_prefix('-') {
                Some(rest) => (true, rest.to_string()),
                None => (false, token),
            };
            match token.split_once(':') {
                Some((field, value)) if !field.is_empty() => TextTerm::Field {
                    field: field.to_string(),
                    value: value.trim_matches('"').to_string(),
                    negate,
                },
                _ => TextTerm::Word { word: token.trim_matches('"').to_string(), negate },
            }
        })
        .collect()
}

fn filter_matches(clause: &FilterClause, doc: &Document) -> bool {
    match clause {
        FilterClause::Term { field, value, negate } => doc.get(field).is_some_and(|v| v.matches(value)) != *negate,
        FilterClause::AnyOf { field, values } => {
            doc.get(field).is_some_and(|v| values.iter().any(|value| v.matches(value)))
        }
        FilterClause::Range { field, min, max, max_inclusive } => {
            let Some(value) = doc.get(field).and_then(|v| v.as_f64()) else {
                return false;
            };
            let above = min.is_none_or(|min| value >= min);
            let below = match max {
                None => true,
                Some(max) if *max_inclusive => value <= *max,
                Some(max) => value < *max,
            };
            above && below
        }
        FilterClause::Radius { latitude, longitude, radius_km } => match (doc.latitude, doc.longitude) {
            (Some(lat), Some(lon)) => haversine_km(*latitude, *longitude, lat, lon) <= *radius_km,
            _ => false,
        },
        FilterClause::Polygon { points } => match (doc.latitude, doc.longitude) {
            (Some(lat), Some(lon)) => point_in_polygon(points, lon, lat),
            _ => false,
        },
        FilterClause::BoundingBox(bbox) => match (doc.latitude, doc.longitude) {
            (Some(lat), Some(lon)) => bbox.contains(lat, lon),
            _ => false,
        },
        FilterClause::NoneOf(clauses) => !clauses.iter().any(|c| filter_matches(c, doc)),
        FilterClause::Raw(text) => parse_text(text).iter().all(|t| t.matches(doc)),
    }
}

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Ray casting over `(longitude, latitude)` vertices.
fn point_in_polygon(points: &[(f64, f64)], x: f64, y: f64) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (xi, yi) = points[i];
        let (xj, yj) = points[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}
