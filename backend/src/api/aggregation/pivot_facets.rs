//! Nested facet trees, one level per pivot field.

use common::facet_pivot::FacetPivotResult;
use common::search_query::{FilterClause, SearchRequest};
use futures::future::{BoxFuture, FutureExt, try_join_all};

use crate::api::search::query_builder::{ExtraParams, build_query};
use crate::api::search::search_facets::single_facet;
use crate::context::SearchContext;
use crate::db_utils::index_client::IndexQuery;

/// Pivot over the request's facets in the order given: each value of the first
/// facet holds the breakdown of the next one within it, count descending at
/// every level.
pub async fn search_pivot(ctx: &SearchContext, request: &SearchRequest) -> anyhow::Result<Vec<FacetPivotResult>> {
    let mut query = build_query(ctx, request, false, &ExtraParams::new()).await?;
    let fields = std::mem::take(&mut query.facet.fields);
    pivot_level(ctx, query, &fields).await
}

fn pivot_level<'a>(ctx: &'a SearchContext, query: IndexQuery, fields: &'a [String]) -> BoxFuture<'a, anyhow::Result<Vec<FacetPivotResult>>> {
    async move {
        let Some((field, rest)) = fields.split_first() else {
            return Ok(Vec::new());
        };
        let mut facet = single_facet(ctx, &query, field, query.facet.limit).await?;
        ctx.labels.translate_facet(&mut facet);
        let children = try_join_all(facet.facet_values.iter().map(|item| {
            let sub_query = query.clone().with_filter(FilterClause::term(field.as_str(), item.original_value.clone()));
            pivot_level(ctx, sub_query, rest)
        }))
        .await?;
        Ok(facet
            .facet_values
            .into_iter()
            .zip(children)
            .map(|(item, pivot)| FacetPivotResult {
                field: field.clone(),
                value: item.original_value,
                display_string: item.display_string,
                count: item.count,
                pivot,
            })
            .collect())
    }
    .boxed()
}
