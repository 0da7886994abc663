//! Legends: facet values or numeric ranges mapped to map colours.

use common::legend::{LegendBucket, LegendItem};
use common::search_const::{COLOUR_PALETTE, OTHER_LABEL, colour_hex};
use common::search_query::{FilterClause, SearchRequest};
use futures::future::try_join_all;

use crate::api::search::query_builder::{ExtraParams, build_query};
use crate::api::search::search_facets::single_facet;
use crate::context::SearchContext;
use crate::db_utils::index_client::IndexQuery;
use crate::error::SearchError;

/// Pseudo facet asking for a single colour for every record.
pub const GRID_LEGEND: &str = "grid";

/// Colour slots available to buckets; the last palette entry is kept for "other".
pub fn colour_slots() -> usize {
    COLOUR_PALETTE.len() - 1
}

fn colour_for(position: usize) -> (usize, String) {
    let index = position % colour_slots();
    (index, colour_hex(index))
}

/// Legend of `facet` over the records matching `request`.
///
/// Numeric facets (explicit `cutpoints`, or a field configured as numeric) get
/// one range bucket per pair of adjacent cut-points. Without cut-points the
/// observed min/max is split into `LEGEND_DEFAULT_BUCKETS` equal intervals,
/// cached until the next cache refresh. Ranges are `[lo, hi)` except the last
/// one which is closed. Other facets get one bucket per value, count
/// descending, with display labels unless `skip_label_lookup` is set.
/// Returns an empty list when nothing matches.
pub async fn legend(
    ctx: &SearchContext,
    request: &SearchRequest,
    facet: &str,
    cutpoints: Option<&[f64]>,
    skip_label_lookup: bool,
) -> anyhow::Result<Vec<LegendItem>> {
    let mut query = build_query(ctx, request, false, &ExtraParams::new()).await?;
    query.facet.fields.clear();
    if cutpoints.is_some() || ctx.config.is_numeric_field(facet) {
        numeric_legend(ctx, &query, facet, cutpoints).await
    } else {
        discrete_legend(ctx, &query, facet, skip_label_lookup).await
    }
}

/// Legend limited to the palette: buckets beyond the available colour slots
/// fold into one "Other" item in the reserved colour, selecting every record
/// outside the listed buckets. The `grid` facet yields a single item covering
/// every record.
pub async fn colours(
    ctx: &SearchContext,
    request: &SearchRequest,
    facet: &str,
    cutpoints: Option<&[f64]>,
    skip_label_lookup: bool,
) -> anyhow::Result<Vec<LegendItem>> {
    if facet == GRID_LEGEND {
        let query = build_query(ctx, request, false, &ExtraParams::new()).await?;
        let total = ctx.index.execute(&query.count_only()).await?.total;
        let (colour_index, colour) = colour_for(0);
        return Ok(vec![LegendItem {
            name: GRID_LEGEND.to_string(),
            bucket: LegendBucket::Other,
            colour_index,
            colour,
            count: total,
            fq: None,
        }]);
    }
    let mut items = legend(ctx, request, facet, cutpoints, skip_label_lookup).await?;
    if items.len() > colour_slots() {
        let rest = items.split_off(colour_slots());
        let other_index = COLOUR_PALETTE.len() - 1;
        let fq = residual_clause(&items);
        items.push(LegendItem {
            name: OTHER_LABEL.to_string(),
            bucket: LegendBucket::Other,
            colour_index: other_index,
            colour: colour_hex(other_index),
            count: rest.iter().map(|i| i.count).sum(),
            fq: Some(fq),
        });
    }
    Ok(items)
}

/// Clause matching the records that fall in none of `items`.
pub fn residual_clause(items: &[LegendItem]) -> FilterClause {
    FilterClause::NoneOf(items.iter().filter_map(|item| item.fq.clone()).collect())
}

async fn discrete_legend(ctx: &SearchContext, query: &IndexQuery, facet: &str, skip_label_lookup: bool) -> anyhow::Result<Vec<LegendItem>> {
    let mut result = single_facet(ctx, query, facet, -1).await?;
    if !skip_label_lookup {
        ctx.labels.translate_facet(&mut result);
    }
    Ok(result
        .facet_values
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            let (colour_index, colour) = colour_for(position);
            LegendItem {
                name: item.display_string,
                fq: Some(FilterClause::term(facet, item.original_value.clone())),
                bucket: LegendBucket::Value(item.original_value),
                colour_index,
                colour,
                count: item.count,
            }
        })
        .collect())
}

async fn numeric_legend(ctx: &SearchContext, query: &IndexQuery, facet: &str, cutpoints: Option<&[f64]>) -> anyhow::Result<Vec<LegendItem>> {
    let cutpoints = match cutpoints {
        Some(given) => {
            let mut sorted = given.iter().copied().filter(|c| c.is_finite()).collect::<Vec<_>>();
            sorted.sort_by(f64::total_cmp);
            sorted.dedup();
            if sorted.len() < 2 {
                return Err(SearchError::invalid_request(format!("legend for {} needs at least two cut-points", facet)).into());
            }
            sorted
        }
        None => match observed_cutpoints(ctx, query, facet).await? {
            Some(computed) => computed,
            None => return Ok(Vec::new()),
        },
    };

    let ranges = cutpoints
        .windows(2)
        .enumerate()
        .map(|(i, pair)| (pair[0], pair[1], i + 2 == cutpoints.len()))
        .collect::<Vec<_>>();
    let counts = try_join_all(ranges.iter().map(|(lo, hi, last)| {
        let bucket_query = query.clone().with_filter(FilterClause::range(facet, Some(*lo), Some(*hi), *last)).count_only();
        async move { Ok::<u64, anyhow::Error>(ctx.index.execute(&bucket_query).await?.total) }
    }))
    .await?;
    if counts.iter().all(|c| *c == 0) {
        return Ok(Vec::new());
    }

    Ok(ranges
        .into_iter()
        .zip(counts)
        .enumerate()
        .map(|(position, ((lo, hi, last), count))| {
            let (colour_index, colour) = colour_for(position);
            LegendItem {
                name: format!("{} - {}", format_bound(lo), format_bound(hi)),
                bucket: LegendBucket::Range { min: lo, max: hi, max_inclusive: last },
                colour_index,
                colour,
                count,
                fq: Some(FilterClause::range(facet, Some(lo), Some(hi), last)),
            }
        })
        .collect())
}

/// Equal-interval cut-points over the observed range of `facet`, `None` when
/// no matching record has a value.
async fn observed_cutpoints(ctx: &SearchContext, query: &IndexQuery, facet: &str) -> anyhow::Result<Option<Vec<f64>>> {
    let cache_key = sha256::digest(format!("{}|{}|{:?}", facet, query.query, query.filters));
    let generation = ctx.labels.snapshot().generation();
    if let Some(cached) = ctx.labels.cached_cutpoints(&cache_key) {
        tracing::debug!("CUTPOINT CACHE HIT: {} {}", facet, cache_key);
        return Ok(Some(cached));
    }
    let Some(stats) = ctx.index.field_stats(query, facet).await? else {
        return Ok(None);
    };
    let cutpoints = equal_intervals(stats.min, stats.max, ctx.config.legend_default_buckets);
    ctx.labels.store_cutpoints(cache_key, cutpoints.clone(), generation);
    Ok(Some(cutpoints))
}

fn equal_intervals(min: f64, max: f64, buckets: usize) -> Vec<f64> {
    if max <= min || buckets < 2 {
        return vec![min, max];
    }
    let width = (max - min) / buckets as f64;
    let mut cutpoints = (0..buckets).map(|i| min + width * i as f64).collect::<Vec<_>>();
    cutpoints.push(max);
    cutpoints
}

fn format_bound(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.4}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
