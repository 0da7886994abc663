//! Dense count grids over a bounding box.

use common::heatmap::{HeatmapCell, HeatmapDTO, HeatmapLayer};
use common::legend::LegendItem;
use common::search_query::{BoundingBox, FilterClause, SearchRequest};
use futures::future::try_join_all;

use crate::api::aggregation::legend::residual_clause;
use crate::api::search::points::parse_point;
use crate::api::search::query_builder::{ExtraParams, build_query};
use crate::api::search::search_facets::single_facet;
use crate::context::SearchContext;
use crate::db_utils::index_client::IndexQuery;
use crate::error::SearchError;

/// Largest accepted number of cells along one side of a grid.
pub const MAX_GRID_SIZE: u32 = 1024;

/// `grid_size x grid_size` counts of the records inside `bbox`, one layer per
/// legend item, or a single layer without a legend. A legend item without a
/// filter takes every record the other items leave out.
pub async fn heatmap(
    ctx: &SearchContext,
    request: &SearchRequest,
    bbox: BoundingBox,
    legend: Option<&[LegendItem]>,
    grid_size: u32,
) -> anyhow::Result<HeatmapDTO> {
    if grid_size == 0 || grid_size > MAX_GRID_SIZE {
        return Err(SearchError::invalid_request(format!(
            "heatmap grid size must be between 1 and {}, got {}",
            MAX_GRID_SIZE, grid_size
        ))
        .into());
    }
    if !(bbox.width() > 0.0 && bbox.height() > 0.0) {
        return Err(SearchError::invalid_request(format!("empty heatmap bounding box: {:?}", bbox)).into());
    }
    let mut query = build_query(ctx, request, false, &ExtraParams::new()).await?;
    query.facet.fields.clear();
    let query = query.with_filter(FilterClause::BoundingBox(bbox));

    let layer_specs = match legend {
        Some(items) if items.iter().any(|i| i.fq.is_some()) => items
            .iter()
            .map(|item| {
                let fq = item.fq.clone().unwrap_or_else(|| residual_clause(items));
                (Some(item.name.clone()), Some(item.colour.clone()), query.clone().with_filter(fq))
            })
            .collect::<Vec<_>>(),
        _ => vec![(None, None, query)],
    };

    let t0 = std::time::Instant::now();
    let layers = try_join_all(
        layer_specs
            .into_iter()
            .map(|(label, colour, layer_query)| heatmap_layer(ctx, layer_query, bbox, grid_size, label, colour)),
    )
    .await?;
    tracing::debug!("heatmap {}x{} with {} layers in {}ms", grid_size, grid_size, layers.len(), t0.elapsed().as_millis());

    Ok(HeatmapDTO {
        bbox,
        grid_size,
        cell_width: bbox.width() / grid_size as f64,
        cell_height: bbox.height() / grid_size as f64,
        layers,
    })
}

async fn heatmap_layer(
    ctx: &SearchContext,
    query: IndexQuery,
    bbox: BoundingBox,
    grid_size: u32,
    label: Option<String>,
    colour: Option<String>,
) -> anyhow::Result<HeatmapLayer> {
    let points = single_facet(ctx, &query, &ctx.config.point_field, -1).await?;
    let mut cells = empty_grid(bbox, grid_size);
    for item in &points.facet_values {
        let Some((lat, lon)) = parse_point(&item.original_value.to_string()) else {
            continue;
        };
        if !bbox.contains(lat, lon) {
            continue;
        }
        let (row, col) = cell_of(bbox, grid_size, lat, lon);
        cells[row as usize * grid_size as usize + col as usize].count += item.count;
    }
    let max_count = cells.iter().map(|c| c.count).max().unwrap_or(0);
    Ok(HeatmapLayer { label, colour, max_count, cells })
}

fn empty_grid(bbox: BoundingBox, grid_size: u32) -> Vec<HeatmapCell> {
    let cell_width = bbox.width() / grid_size as f64;
    let cell_height = bbox.height() / grid_size as f64;
    let edge = |min: f64, max: f64, step: f64, i: u32| if i == grid_size { max } else { min + step * i as f64 };
    let side = grid_size as usize;
    let mut cells = Vec::with_capacity(side * side);
    for row in 0..grid_size {
        for col in 0..grid_size {
            cells.push(HeatmapCell {
                row,
                col,
                bbox: BoundingBox::new(
                    edge(bbox.min_longitude, bbox.max_longitude, cell_width, col),
                    edge(bbox.min_latitude, bbox.max_latitude, cell_height, row),
                    edge(bbox.min_longitude, bbox.max_longitude, cell_width, col + 1),
                    edge(bbox.min_latitude, bbox.max_latitude, cell_height, row + 1),
                ),
                count: 0,
            });
        }
    }
    cells
}

/// Points on the northern or eastern edge belong to the last row or column.
fn cell_of(bbox: BoundingBox, grid_size: u32, lat: f64, lon: f64) -> (u32, u32) {
    let index = |offset: f64, extent: f64| {
        let i = (offset / extent * grid_size as f64).floor();
        (i.max(0.0) as u32).min(grid_size - 1)
    };
    (index(lat - bbox.min_latitude, bbox.height()), index(lon - bbox.min_longitude, bbox.width()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_tile_the_box() {
        let bbox = BoundingBox::new(150.0, -35.0, 152.0, -33.0);
        let cells = empty_grid(bbox, 4);
        assert_eq!(cells.len(), 16);
        assert_eq!(cells[0].bbox, BoundingBox::new(150.0, -35.0, 150.5, -34.5));
        assert_eq!(cells[15].bbox.max_longitude, 152.0);
        assert_eq!(cells[15].bbox.max_latitude, -33.0);
        let area: f64 = cells.iter().map(|c| c.bbox.width() * c.bbox.height()).sum();
        assert!((area - bbox.width() * bbox.height()).abs() < 1e-9);
    }

    #[test]
    fn edges_clamp_into_the_grid() {
        let bbox = BoundingBox::new(150.0, -35.0, 152.0, -33.0);
        assert_eq!(cell_of(bbox, 4, -35.0, 150.0), (0, 0));
        assert_eq!(cell_of(bbox, 4, -33.0, 152.0), (3, 3));
        assert_eq!(cell_of(bbox, 4, -34.4, 151.1), (1, 2));
    }
}
