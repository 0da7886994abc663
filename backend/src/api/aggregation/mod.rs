//! Derived aggregates: legends, heatmaps, breakdowns, pivots and stats.

mod legend;
pub use legend::{GRID_LEGEND, colour_slots, colours, legend, residual_clause};

mod heatmap;
pub use heatmap::{MAX_GRID_SIZE, heatmap};

mod breakdown;
pub use breakdown::{breakdown, occurrence_counts_for_taxa};

mod pivot_facets;
pub use pivot_facets::search_pivot;

mod grouped_facets;
pub use grouped_facets::search_grouped_facets;

mod stats;
pub use stats::{bounding_box, search_stat};

pub mod outlier_stats;
pub use outlier_stats::outlier_stats_for;
