use common::search_query::SearchRequest;

use crate::api::search::query_builder::{ExtraParams, build_query};
use crate::context::SearchContext;

pub async fn search_for_results_hit_count(ctx: &SearchContext, request: &SearchRequest) -> anyhow::Result<u64> {
    let query = build_query(ctx, request, false, &ExtraParams::new()).await?;
    let response = ctx.index.execute(&query.count_only()).await?;
    Ok(response.total)
}
