//! Heatmap grid models.

use serde::{Deserialize, Serialize};

use crate::search_query::BoundingBox;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    /// Row 0 is the southern edge of the box.
    pub row: u32,
    /// Column 0 is the western edge of the box.
    pub col: u32,
    pub bbox: BoundingBox,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapLayer {
    pub label: Option<String>,
    pub colour: Option<String>,
    pub max_count: u64,
    /// Row-major, always `grid_size * grid_size` entries.
    pub cells: Vec<HeatmapCell>,
}

impl HeatmapLayer {
    pub fn total_count(&self) -> u64 {
        self.cells.iter().map(|c| c.count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapDTO {
    pub bbox: BoundingBox,
    pub grid_size: u32,
    pub cell_width: f64,
    pub cell_height: f64,
    pub layers: Vec<HeatmapLayer>,
}
