//! Taxonomic breakdown models using nested-set ranges.

use serde::{Deserialize, Serialize};

/// A taxon and its `[left, right]` nested-set bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonRange {
    pub name: String,
    pub rank: String,
    pub left: i64,
    pub right: i64,
}

impl TaxonRange {
    pub fn new(name: impl Into<String>, rank: impl Into<String>, left: i64, right: i64) -> Self {
        Self { name: name.into(), rank: rank.into(), left, right }
    }

    pub fn contains(&self, left_value: i64) -> bool {
        left_value >= self.left && left_value <= self.right
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxaCount {
    pub name: String,
    pub rank: String,
    pub left: i64,
    pub right: i64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaxaRankCount {
    pub rank: Option<String>,
    pub taxa: Vec<TaxaCount>,
}

/// A species of the result set and its record count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesCount {
    pub guid: String,
    pub name: String,
    pub count: u64,
}
