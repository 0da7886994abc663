//! Turns a caller's search request into an executable index query.

use std::collections::BTreeMap;

use common::search_query::{FacetSort, MATCH_ALL, SearchRequest, SortDirection};

use crate::context::SearchContext;
use crate::db_utils::index_client::{FacetOptions, IndexQuery};
use crate::error::SearchError;

pub type ExtraParams = BTreeMap<String, Vec<String>>;

/// Builds the index query for `request`.
///
/// A `qid:` free text is replaced by the stored query it names, and fails with
/// [`SearchError::QueryIdNotFound`] before the index is touched when the id is
/// unknown. `extra_params` are applied last and override everything derived
/// from the request. The result is checked against the index's boolean clause
/// limit.
pub async fn build_query(
    ctx: &SearchContext,
    request: &SearchRequest,
    substitute_default_facet_order: bool,
    extra_params: &ExtraParams,
) -> anyhow::Result<IndexQuery> {
    let mut filters = request.filters.clone();
    if let Some(spatial) = &request.spatial {
        filters.push(spatial.to_clause());
    }

    let text = match request.query_id() {
        Some(qid) => {
            let Some(stored) = ctx.qid_store.get(qid).await? else {
                tracing::info!("unresolvable query id {}", qid);
                return Err(SearchError::QueryIdNotFound { qid: qid.to_string() }.into());
            };
            filters.extend(stored.filters);
            if let Some(spatial) = stored.spatial {
                filters.push(spatial.to_clause());
            }
            stored.query
        }
        None => request.query.clone(),
    };
    let text = if text.trim().is_empty() { MATCH_ALL.to_string() } else { text };

    let mut query = IndexQuery {
        query: text,
        filters,
        start: request.start,
        rows: request.page_size,
        sort: request.sort.clone().map(|field| (field, request.dir)),
        fields: Vec::new(),
        facet: FacetOptions {
            fields: order_facets(&request.facets, &ctx.config.default_facets, substitute_default_facet_order),
            limit: request.facet_limit.unwrap_or(ctx.config.facet_default_limit),
            min_count: 1,
            sort: request.facet_sort.unwrap_or_default(),
            offset: 0,
        },
        params: BTreeMap::new(),
    };
    apply_extra_params(&mut query, extra_params)?;

    let max = ctx.index.max_clause_count().await?;
    let clauses = query.clause_count();
    if clauses > max {
        return Err(SearchError::QueryTooComplex { clauses, max }.into());
    }
    Ok(query)
}

/// Requested facets without duplicates. With `substitute` the fields listed in
/// `default_order` come first, in that order; the rest keep their relative order.
pub fn order_facets(requested: &[String], default_order: &[String], substitute: bool) -> Vec<String> {
    let mut facets: Vec<String> = Vec::new();
    for facet in requested {
        if !facet.is_empty() && !facets.contains(facet) {
            facets.push(facet.clone());
        }
    }
    if substitute {
        let rank = |f: &String| default_order.iter().position(|d| d == f).unwrap_or(usize::MAX);
        facets.sort_by_key(|f| rank(f));
    }
    facets
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SearchError::invalid_request(format!("invalid value for {}: {:?}", key, value)).into())
}

fn apply_extra_params(query: &mut IndexQuery, extra_params: &ExtraParams) -> anyhow::Result<()> {
    for (key, values) in extra_params {
        let Some(value) = values.last() else {
            continue;
        };
        match key.as_str() {
            "facet.limit" => query.facet.limit = parse_param(key, value)?,
            "facet.mincount" => query.facet.min_count = parse_param(key, value)?,
            "facet.offset" => query.facet.offset = parse_param(key, value)?,
            "facet.sort" => {
                query.facet.sort = match value.as_str() {
                    "count" => FacetSort::Count,
                    "index" => FacetSort::Index,
                    other => return Err(SearchError::invalid_request(format!("invalid facet.sort: {:?}", other)).into()),
                }
            }
            "facet.field" => {
                for field in values {
                    if !query.facet.fields.contains(field) {
                        query.facet.fields.push(field.clone());
                    }
                }
            }
            "start" => query.start = parse_param(key, value)?,
            "rows" => query.rows = parse_param(key, value)?,
            "sort" => {
                let dir = query.sort.as_ref().map_or(SortDirection::Asc, |(_, d)| *d);
                query.sort = Some((value.clone(), dir));
            }
            "dir" => {
                let dir = if value.eq_ignore_ascii_case("desc") { SortDirection::Desc } else { SortDirection::Asc };
                if let Some((_, d)) = query.sort.as_mut() {
                    *d = dir;
                }
            }
            "fl" => {
                query.fields = values
                    .iter()
                    .flat_map(|v| v.split(','))
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect();
            }
            _ => {
                query.params.insert(key.clone(), values.clone());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use common::search_query::FilterClause;

    use crate::config::SearchConfig;
    use crate::db_utils::memory_index::MemoryIndex;
    use crate::db_utils::qid_store::{MemoryQidStore, StoredQuery};

    fn context(index: Arc<MemoryIndex>) -> SearchContext {
        let store = MemoryQidStore::new();
        store.insert(
            "xyz789",
            StoredQuery {
                query: "genus:Macropus".to_string(),
                filters: vec![FilterClause::term("state", "NSW")],
                spatial: None,
            },
        );
        SearchContext::new(SearchConfig::default(), index).with_qid_store(Arc::new(store))
    }

    #[tokio::test]
    async fn missing_query_id_fails_without_index_call() {
        let index = Arc::new(MemoryIndex::new(Vec::new()));
        let ctx = context(index.clone());
        let err = build_query(&ctx, &SearchRequest::new("qid:abc123"), false, &ExtraParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<SearchError>(), Some(SearchError::QueryIdNotFound { qid }) if qid == "abc123"));
        assert!(index.executed_queries().is_empty());
    }

    #[tokio::test]
    async fn query_id_expands_into_stored_clauses() {
        let ctx = context(Arc::new(MemoryIndex::new(Vec::new())));
        let request = SearchRequest::new("qid:xyz789").with_filter(FilterClause::term("year", 2001));
        let query = build_query(&ctx, &request, false, &ExtraParams::new()).await.unwrap();
        assert_eq!(query.query, "genus:Macropus");
        assert_eq!(query.filters, vec![FilterClause::term("year", 2001), FilterClause::term("state", "NSW")]);
    }

    #[tokio::test]
    async fn extra_params_override_defaults() {
        let ctx = context(Arc::new(MemoryIndex::new(Vec::new())));
        let request = SearchRequest::new("*:*").with_facets(["year"]);
        let mut extra = ExtraParams::new();
        extra.insert("facet.limit".to_string(), vec!["-1".to_string()]);
        extra.insert("rows".to_string(), vec!["0".to_string()]);
        extra.insert("option.ranker".to_string(), vec!["none".to_string()]);
        let query = build_query(&ctx, &request, false, &extra).await.unwrap();
        assert_eq!(query.facet.limit, -1);
        assert_eq!(query.rows, 0);
        assert!(query.params.contains_key("option.ranker"));
    }

    #[tokio::test]
    async fn too_many_clauses_is_rejected() {
        let index = Arc::new(MemoryIndex::new(Vec::new()).with_max_clause_count(3));
        let ctx = context(index);
        let request = SearchRequest::new("*:*").with_filter(FilterClause::AnyOf {
            field: "species_guid".to_string(),
            values: (0..4).map(|i: i64| i.into()).collect(),
        });
        let err = build_query(&ctx, &request, false, &ExtraParams::new()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<SearchError>(), Some(SearchError::QueryTooComplex { clauses: 4, max: 3 })));
    }

    #[test]
    fn default_facet_order_is_substituted() {
        let default_order = vec!["rank".to_string(), "state".to_string()];
        let requested = vec!["year".to_string(), "state".to_string(), "rank".to_string(), "state".to_string()];
        assert_eq!(order_facets(&requested, &default_order, false), vec!["year", "state", "rank"]);
        assert_eq!(order_facets(&requested, &default_order, true), vec!["rank", "state", "year"]);
    }
}
