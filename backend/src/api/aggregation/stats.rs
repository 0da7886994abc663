//! Numeric field statistics and spatial extent.

use common::search_query::{BoundingBox, FilterClause, SearchRequest};
use common::search_result::{FacetValue, FieldStatsItem};
use futures::future::try_join_all;

use crate::api::search::query_builder::{ExtraParams, build_query};
use crate::api::search::search_facets::single_facet;
use crate::context::SearchContext;
use crate::db_utils::index_client::{FieldStats, IndexQuery};

fn stats_item(field: &str, facet_value: Option<FacetValue>, stats: FieldStats) -> FieldStatsItem {
    FieldStatsItem {
        field: field.to_string(),
        facet_value,
        count: stats.count,
        min: stats.min,
        max: stats.max,
        sum: stats.sum,
        mean: stats.mean(),
    }
}

async fn base_query(ctx: &SearchContext, request: &SearchRequest) -> anyhow::Result<IndexQuery> {
    let mut query = build_query(ctx, request, false, &ExtraParams::new()).await?;
    query.facet.fields.clear();
    Ok(query)
}

/// Statistics of `field`, overall or one row per value of `facet`. Values
/// whose records carry no `field` are left out.
pub async fn search_stat(
    ctx: &SearchContext,
    request: &SearchRequest,
    field: &str,
    facet: Option<&str>,
) -> anyhow::Result<Vec<FieldStatsItem>> {
    let query = base_query(ctx, request).await?;
    let Some(facet) = facet else {
        let stats = ctx.index.field_stats(&query, field).await?;
        return Ok(stats.map(|s| stats_item(field, None, s)).into_iter().collect());
    };
    let values = single_facet(ctx, &query, facet, query.facet.limit).await?;
    let rows = try_join_all(values.facet_values.into_iter().map(|item| {
        let value_query = query.clone().with_filter(FilterClause::term(facet, item.original_value.clone()));
        async move {
            let stats = ctx.index.field_stats(&value_query, field).await?;
            Ok::<_, anyhow::Error>(stats.map(|s| stats_item(field, Some(item.original_value), s)))
        }
    }))
    .await?;
    Ok(rows.into_iter().flatten().collect())
}

/// Smallest box holding every matching record, `None` without coordinates.
pub async fn bounding_box(ctx: &SearchContext, request: &SearchRequest) -> anyhow::Result<Option<BoundingBox>> {
    let query = base_query(ctx, request).await?;
    let (lat, lon) = futures::try_join!(ctx.index.field_stats(&query, "latitude"), ctx.index.field_stats(&query, "longitude"))?;
    Ok(match (lat, lon) {
        (Some(lat), Some(lon)) => Some(BoundingBox::new(lon.min, lat.min, lon.max, lat.max)),
        _ => None,
    })
}
