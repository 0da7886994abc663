//! Pivot and grouped facet trees.

use serde::{Deserialize, Serialize};

use crate::search_result::{Document, FacetValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetPivotResult {
    pub field: String,
    pub value: FacetValue,
    pub display_string: String,
    pub count: u64,
    pub pivot: Vec<FacetPivotResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetGroup {
    pub value: FacetValue,
    pub count: u64,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedFacetResult {
    pub field: String,
    pub groups: Vec<FacetGroup>,
}
