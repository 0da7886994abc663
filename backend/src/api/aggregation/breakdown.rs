//! Occurrence counts rolled up over nested-set taxon ranges.

use common::search_query::SearchRequest;
use common::taxon_breakdown::{TaxaCount, TaxaRankCount, TaxonRange};

use crate::api::search::search_facets::facet_values;
use crate::context::SearchContext;

/// Record counts keyed by taxon left bound, sorted by bound, with running totals.
struct LeftBoundCounts {
    bounds: Vec<i64>,
    /// `prefix[i]` is the sum of counts of `bounds[..i]`.
    prefix: Vec<u64>,
}

impl LeftBoundCounts {
    fn new(mut pairs: Vec<(i64, u64)>) -> Self {
        pairs.sort_unstable_by_key(|(bound, _)| *bound);
        let mut prefix = Vec::with_capacity(pairs.len() + 1);
        prefix.push(0);
        for (_, count) in &pairs {
            prefix.push(prefix[prefix.len() - 1] + count);
        }
        Self { bounds: pairs.into_iter().map(|(bound, _)| bound).collect(), prefix }
    }

    /// Sum of counts with `left <= bound <= right`.
    fn within(&self, left: i64, right: i64) -> u64 {
        if right < left {
            return 0;
        }
        let lo = self.bounds.partition_point(|b| *b < left);
        let hi = self.bounds.partition_point(|b| *b <= right);
        self.prefix[hi] - self.prefix[lo]
    }
}

async fn left_bound_counts(ctx: &SearchContext, request: &SearchRequest) -> anyhow::Result<LeftBoundCounts> {
    let facet = facet_values(ctx, request, &ctx.config.taxon_left_field).await?;
    let pairs = facet
        .facet_values
        .into_iter()
        .filter_map(|item| Some((item.original_value.as_i64()?, item.count)))
        .collect();
    Ok(LeftBoundCounts::new(pairs))
}

/// Record count of every taxon in `taxa`. Each taxon is summed on its own, so
/// a parent and its children may both be listed.
pub async fn occurrence_counts_for_taxa(
    ctx: &SearchContext,
    request: &SearchRequest,
    taxa: &[TaxonRange],
) -> anyhow::Result<Vec<TaxaCount>> {
    let counts = left_bound_counts(ctx, request).await?;
    Ok(taxa
        .iter()
        .map(|taxon| TaxaCount {
            name: taxon.name.clone(),
            rank: taxon.rank.clone(),
            left: taxon.left,
            right: taxon.right,
            count: counts.within(taxon.left, taxon.right),
        })
        .collect())
}

/// Breakdown of the records over `taxa`, restricted to `rank` when given.
/// Taxa without records are dropped; the rest are ordered by count.
pub async fn breakdown(
    ctx: &SearchContext,
    request: &SearchRequest,
    rank: Option<&str>,
    taxa: &[TaxonRange],
) -> anyhow::Result<TaxaRankCount> {
    let selected = taxa
        .iter()
        .filter(|t| rank.is_none_or(|r| t.rank.eq_ignore_ascii_case(r)))
        .cloned()
        .collect::<Vec<_>>();
    let mut counted = occurrence_counts_for_taxa(ctx, request, &selected)
        .await?
        .into_iter()
        .filter(|t| t.count > 0)
        .collect::<Vec<_>>();
    counted.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    Ok(TaxaRankCount { rank: rank.map(str::to_string), taxa: counted })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_inclusive_and_nested() {
        let counts = LeftBoundCounts::new(vec![(10, 1), (12, 2), (15, 4), (20, 8)]);
        assert_eq!(counts.within(10, 20), 15);
        assert_eq!(counts.within(12, 15), 6);
        assert_eq!(counts.within(13, 14), 0);
        assert_eq!(counts.within(20, 10), 0);
    }
}
