//! Legend models for map rendering.

use serde::{Deserialize, Serialize};

use crate::search_query::FilterClause;
use crate::search_result::FacetValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LegendBucket {
    Value(FacetValue),
    /// `[min, max)`, or `[min, max]` when `max_inclusive`.
    Range { min: f64, max: f64, max_inclusive: bool },
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendItem {
    pub name: String,
    pub bucket: LegendBucket,
    pub colour_index: usize,
    pub colour: String,
    pub count: u64,
    /// Clause selecting the records of this bucket.
    pub fq: Option<FilterClause>,
}
