//! Lookup caches used by the aggregation code.

pub mod label_cache;

use crate::context::SearchContext;

/// Reloads every cache. Idempotent and safe while queries are in flight.
pub async fn refresh_caches(ctx: &SearchContext) -> anyhow::Result<()> {
    ctx.labels.refresh().await?;
    Ok(())
}
