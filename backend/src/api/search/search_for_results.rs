//! Full-text spatial search for result lists.

use common::search_query::SearchRequest;
use common::search_result::{Document, FacetResult, SearchResult};

use crate::api::search::query_builder::{ExtraParams, build_query};
use crate::api::search::sensitive::apply_sensitivity;
use crate::context::SearchContext;

/// One page of occurrences for a free-text and spatial query, with the
/// request's facets translated to display labels.
pub async fn search_for_results(
    ctx: &SearchContext,
    request: &SearchRequest,
    extra_params: &ExtraParams,
) -> anyhow::Result<SearchResult> {
    let query = build_query(ctx, request, true, extra_params).await?;
    let t0 = std::time::Instant::now();
    let page = ctx.index.execute(&query).await?;
    tracing::info!(
        "search {:?}: {} hits, {} facets in {}ms",
        query.query,
        page.total,
        page.facets.len(),
        t0.elapsed().as_millis()
    );

    let occurrences = page
        .documents
        .into_iter()
        .map(|mut doc| {
            apply_sensitivity(&mut doc, request.include_sensitive, &ctx.config.sensitive_fields);
            doc
        })
        .collect();
    let facet_results = page
        .facets
        .into_iter()
        .filter(|f| !f.facet_values.is_empty())
        .map(|mut facet| {
            ctx.labels.translate_facet(&mut facet);
            facet
        })
        .collect::<Vec<FacetResult>>();

    Ok(SearchResult {
        total_records: page.total,
        start: query.start,
        page_size: query.rows,
        query: query.query,
        occurrences,
        facet_results,
    })
}

/// Matching documents only, sensitive values redacted.
pub async fn find_by_fulltext(ctx: &SearchContext, request: &SearchRequest) -> anyhow::Result<Vec<Document>> {
    let mut query = build_query(ctx, request, false, &ExtraParams::new()).await?;
    query.facet.fields.clear();
    let page = ctx.index.execute(&query).await?;
    Ok(page
        .documents
        .into_iter()
        .map(|mut doc| {
            apply_sensitivity(&mut doc, false, &ctx.config.sensitive_fields);
            doc
        })
        .collect())
}
