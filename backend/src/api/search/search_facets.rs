//! Facet counts and facet exports.

use std::collections::BTreeMap;

use common::search_query::{FacetSort, SearchRequest};
use common::search_result::{FacetItem, FacetResult};

use crate::api::download::download_details::DownloadDetails;
use crate::api::download::row_sink::RowSink;
use crate::api::search::query_builder::{ExtraParams, build_query};
use crate::context::SearchContext;
use crate::db_utils::index_client::IndexQuery;

/// Facets requested by `request`, in the configured default order, labels
/// translated. Facets without values are left out.
pub async fn facet_counts(ctx: &SearchContext, request: &SearchRequest) -> anyhow::Result<Vec<FacetResult>> {
    let query = build_query(ctx, request, true, &ExtraParams::new()).await?;
    if query.facet.fields.is_empty() {
        return Ok(Vec::new());
    }
    let facets = ctx.index.execute_facets(&query).await?;
    Ok(facets
        .into_iter()
        .filter(|f| !f.facet_values.is_empty())
        .map(|mut facet| {
            ctx.labels.translate_facet(&mut facet);
            facet
        })
        .collect())
}

/// Every value of `field` for the request, count descending.
pub(crate) async fn facet_values(ctx: &SearchContext, request: &SearchRequest, field: &str) -> anyhow::Result<FacetResult> {
    let query = build_query(ctx, request, false, &ExtraParams::new()).await?;
    single_facet(ctx, &query, field, -1).await
}

pub(crate) async fn single_facet(ctx: &SearchContext, query: &IndexQuery, field: &str, limit: i64) -> anyhow::Result<FacetResult> {
    let facets = ctx.index.execute_facets(&query.facet_only(field, limit)).await?;
    Ok(facets.into_iter().find(|f| f.facet_field == field).unwrap_or_else(|| FacetResult::new(field)))
}

/// Header row of a facet export.
pub(crate) fn facet_header(field: &str, include_count: bool, lookup_name: bool) -> Vec<String> {
    let mut header = vec![field.to_string()];
    if lookup_name {
        header.push(format!("{} label", field));
    }
    if include_count {
        header.push("count".to_string());
    }
    header
}

pub(crate) async fn write_facet_rows(
    ctx: &SearchContext,
    field: &str,
    items: &[FacetItem],
    include_count: bool,
    lookup_name: bool,
    sink: &mut dyn RowSink,
) -> anyhow::Result<u64> {
    let snapshot = ctx.labels.snapshot();
    for item in items {
        let value = item.original_value.to_string();
        let mut row = vec![value.clone()];
        if lookup_name {
            row.push(snapshot.label(field, &value).unwrap_or(&value).to_string());
        }
        if include_count {
            row.push(item.count.to_string());
        }
        sink.write_row(&row).await?;
    }
    Ok(items.len() as u64)
}

/// Writes every value of the request's first facet to `sink`, fetching the
/// facet in index-sorted batches of `DOWNLOAD_PAGE_SIZE` values.
pub async fn write_facet_to_stream(
    ctx: &SearchContext,
    request: &SearchRequest,
    include_count: bool,
    lookup_name: bool,
    sink: &mut dyn RowSink,
    details: &DownloadDetails,
) -> anyhow::Result<u64> {
    let Some(field) = request.facets.first() else {
        return Ok(0);
    };
    let mut query = build_query(ctx, request, false, &ExtraParams::new()).await?;
    query.facet.sort = FacetSort::Index;
    let batch = ctx.config.download_page_size.max(1);

    sink.write_row(&facet_header(field, include_count, lookup_name)).await?;
    let mut written = 0u64;
    loop {
        if details.is_cancelled() {
            tracing::info!("facet export of {} cancelled after {} values", field, written);
            break;
        }
        let mut page_query = query.facet_only(field, batch as i64);
        page_query.facet.offset = written;
        let facet = ctx
            .index
            .execute_facets(&page_query)
            .await?
            .into_iter()
            .find(|f| &f.facet_field == field)
            .unwrap_or_else(|| FacetResult::new(field));
        let n = write_facet_rows(ctx, field, &facet.facet_values, include_count, lookup_name, sink).await?;
        details.page_fetched();
        details.add_written(n);
        written += n;
        if n < batch {
            break;
        }
    }
    sink.flush().await?;
    Ok(written)
}

/// Record count per data source.
pub async fn sources_for_query(ctx: &SearchContext, request: &SearchRequest) -> anyhow::Result<BTreeMap<String, u64>> {
    let facet = facet_values(ctx, request, &ctx.config.data_source_field).await?;
    Ok(facet
        .facet_values
        .into_iter()
        .map(|item| (item.original_value.to_string(), item.count))
        .collect())
}

/// Data providers contributing to the request, with display names.
pub async fn data_provider_list(ctx: &SearchContext, request: &SearchRequest) -> anyhow::Result<Vec<FacetItem>> {
    let mut facet = facet_values(ctx, request, &ctx.config.data_provider_field).await?;
    ctx.labels.translate_facet(&mut facet);
    Ok(facet.facet_values)
}

/// Facetable fields holding at least one value among the matching records,
/// in configured order.
pub async fn list_facets(ctx: &SearchContext, request: &SearchRequest) -> anyhow::Result<Vec<String>> {
    let candidates = &ctx.config.facetable_fields;
    let Some(first) = candidates.first() else {
        return Ok(Vec::new());
    };
    let query = build_query(ctx, request, false, &ExtraParams::new()).await?;
    let mut listing = query.facet_only(first, 1);
    listing.facet.fields = candidates.clone();
    listing.facet.min_count = 1;
    let facets = ctx.index.execute_facets(&listing).await?;
    Ok(candidates
        .iter()
        .filter(|field| facets.iter().any(|f| &f.facet_field == *field && !f.facet_values.is_empty()))
        .cloned()
        .collect())
}

/// Number of distinct values of `facet` among the matching records.
pub async fn estimate_unique_values(ctx: &SearchContext, request: &SearchRequest, facet: &str) -> anyhow::Result<u64> {
    Ok(facet_values(ctx, request, facet).await?.facet_values.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use common::search_result::{Document, FieldValue};

    use crate::api::download::row_sink::MemorySink;
    use crate::config::SearchConfig;
    use crate::db_utils::memory_index::MemoryIndex;

    fn context() -> SearchContext {
        let mut config = SearchConfig::default();
        config.download_page_size = 2;
        context_with(config)
    }

    fn context_with(config: SearchConfig) -> SearchContext {
        let docs = (0..7)
            .map(|i| {
                Document::new(i.to_string(), format!("dr{}", i % 3))
                    .with_field("data_provider_uid", FieldValue::Str(format!("dp{}", i % 2)))
                    .with_field("state", FieldValue::Str(["NSW", "VIC", "QLD", "TAS"][i % 4].to_string()))
            })
            .collect();
        SearchContext::new(config, Arc::new(MemoryIndex::new(docs)))
    }

    #[tokio::test]
    async fn sources_count_every_record() {
        let sources = sources_for_query(&context(), &SearchRequest::default()).await.unwrap();
        assert_eq!(sources.get("dr0"), Some(&3));
        assert_eq!(sources.values().sum::<u64>(), 7);
    }

    #[tokio::test]
    async fn unique_values_and_providers() {
        let ctx = context();
        assert_eq!(estimate_unique_values(&ctx, &SearchRequest::default(), "state").await.unwrap(), 4);
        let providers = data_provider_list(&ctx, &SearchRequest::default()).await.unwrap();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].count, 4);
    }

    #[tokio::test]
    async fn listed_facets_are_the_populated_ones() {
        let mut config = SearchConfig::default();
        config.facetable_fields = ["genus", "state", "data_provider_uid", "year"].map(String::from).to_vec();
        let facets = list_facets(&context_with(config), &SearchRequest::default()).await.unwrap();
        assert_eq!(facets, vec!["state", "data_provider_uid"]);

        let mut config = SearchConfig::default();
        config.facetable_fields.clear();
        assert!(list_facets(&context_with(config), &SearchRequest::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn facet_stream_pages_through_all_values() {
        let ctx = context();
        let mut sink = MemorySink::new();
        let details = DownloadDetails::new();
        let request = SearchRequest::default().with_facets(["state"]);
        let written = write_facet_to_stream(&ctx, &request, true, false, &mut sink, &details).await.unwrap();
        assert_eq!(written, 4);
        let rows = sink.rows();
        assert_eq!(rows[0], vec!["state", "count"]);
        assert_eq!(rows[1], vec!["NSW", "2"]);
        assert_eq!(rows.len(), 5);
        assert_eq!(details.records_written(), 4);
    }
}
