//! Facet values found under one query and absent from another.

use std::collections::HashSet;

use common::search_query::SearchRequest;
use common::search_result::FacetItem;

use crate::api::download::row_sink::RowSink;
use crate::api::search::search_facets::{facet_header, facet_values, write_facet_rows};
use crate::context::SearchContext;
use crate::error::SearchError;

/// Values of `facet` present under `sub_query` but not under `parent_query`,
/// in `sub_query`'s count-descending order.
pub async fn endemic_facet(
    ctx: &SearchContext,
    sub_query: &SearchRequest,
    parent_query: &SearchRequest,
    facet: &str,
) -> anyhow::Result<Vec<FacetItem>> {
    let (sub, parent) = futures::try_join!(
        facet_values(ctx, sub_query, facet),
        facet_values(ctx, parent_query, facet)
    )?;
    let parent_values = parent.facet_values.iter().map(|item| &item.original_value).collect::<HashSet<_>>();
    let endemic = sub
        .facet_values
        .iter()
        .filter(|item| !parent_values.contains(&item.original_value))
        .cloned()
        .collect::<Vec<_>>();
    tracing::debug!(
        "endemic {}: {} of {} values absent from parent query",
        facet,
        endemic.len(),
        sub.facet_values.len()
    );
    Ok(endemic)
}

/// Species only recorded under `sub_query`.
pub async fn subquery_species_only(
    ctx: &SearchContext,
    sub_query: &SearchRequest,
    parent_query: &SearchRequest,
) -> anyhow::Result<Vec<FacetItem>> {
    endemic_facet(ctx, sub_query, parent_query, &ctx.config.species_field).await
}

/// Writes the endemic values of `parent_query`'s first facet to `sink`.
pub async fn write_endemic_facet_to_stream(
    ctx: &SearchContext,
    sub_query: &SearchRequest,
    parent_query: &SearchRequest,
    include_count: bool,
    lookup_name: bool,
    sink: &mut dyn RowSink,
) -> anyhow::Result<u64> {
    let Some(facet) = parent_query.facets.first() else {
        return Err(SearchError::invalid_request("endemic export needs a facet on the parent query").into());
    };
    let items = endemic_facet(ctx, sub_query, parent_query, facet).await?;
    sink.write_row(&facet_header(facet, include_count, lookup_name)).await?;
    let written = write_facet_rows(ctx, facet, &items, include_count, lookup_name, sink).await?;
    sink.flush().await?;
    Ok(written)
}
