//! Facet values with a page of matching documents each.

use common::facet_pivot::{FacetGroup, GroupedFacetResult};
use common::search_query::{FilterClause, SearchRequest};
use futures::future::try_join_all;

use crate::api::search::query_builder::{ExtraParams, build_query};
use crate::api::search::search_facets::single_facet;
use crate::api::search::sensitive::apply_sensitivity;
use crate::context::SearchContext;

/// For each requested facet, the top `flimit` values and up to `page_size`
/// documents per value. Both limits apply independently.
pub async fn search_grouped_facets(ctx: &SearchContext, request: &SearchRequest) -> anyhow::Result<Vec<GroupedFacetResult>> {
    let mut query = build_query(ctx, request, false, &ExtraParams::new()).await?;
    let fields = std::mem::take(&mut query.facet.fields);
    let group_limit = request.flimit.map_or(ctx.config.facet_default_limit, |l| l as i64);
    let query = &query;

    try_join_all(fields.into_iter().map(|field| async move {
        let facet = single_facet(ctx, query, &field, group_limit).await?;
        let groups = try_join_all(facet.facet_values.into_iter().map(|item| {
            let field = field.as_str();
            async move {
                let group_query = query
                    .clone()
                    .with_filter(FilterClause::term(field, item.original_value.clone()))
                    .page(query.start, request.page_size);
                let mut page = ctx.index.execute(&group_query).await?;
                for doc in &mut page.documents {
                    apply_sensitivity(doc, request.include_sensitive, &ctx.config.sensitive_fields);
                }
                Ok::<FacetGroup, anyhow::Error>(FacetGroup { value: item.original_value, count: item.count, documents: page.documents })
            }
        }))
        .await?;
        Ok::<GroupedFacetResult, anyhow::Error>(GroupedFacetResult { field, groups })
    }))
    .await
}
