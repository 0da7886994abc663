//! Distinct occurrence points derived from the point facet.

use std::collections::BTreeMap;

use common::search_query::{SearchRequest, SpatialFilter};
use common::search_result::{FacetResult, OccurrencePoint, PointType};

use crate::api::download::row_sink::RowSink;
use crate::api::search::search_facets::facet_values;
use crate::context::SearchContext;
use crate::error::SearchError;

/// Parses a `"lat,lon"` point facet value.
pub fn parse_point(value: &str) -> Option<(f64, f64)> {
    let (lat, lon) = value.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)).then_some((lat, lon))
}

fn points_from_facet(facet: &FacetResult, point_type: PointType) -> Vec<OccurrencePoint> {
    // keyed on the rounded text so equal points merge
    let mut merged: BTreeMap<(String, String), OccurrencePoint> = BTreeMap::new();
    for item in &facet.facet_values {
        let Some((lat, lon)) = parse_point(&item.original_value.to_string()) else {
            continue;
        };
        let (lat, lon) = (point_type.round(lat), point_type.round(lon));
        let point = merged
            .entry((lat.to_string(), lon.to_string()))
            .or_insert(OccurrencePoint { latitude: lat, longitude: lon, count: 0 });
        point.count += item.count;
    }
    let mut points = merged.into_values().collect::<Vec<_>>();
    points.sort_by(|a, b| b.count.cmp(&a.count));
    points
}

/// Distinct points of the matching records at `point_type` precision, most
/// populated first.
pub async fn facet_points(ctx: &SearchContext, request: &SearchRequest, point_type: PointType) -> anyhow::Result<Vec<OccurrencePoint>> {
    let facet = facet_values(ctx, request, &ctx.config.point_field).await?;
    Ok(points_from_facet(&facet, point_type))
}

/// Like [`facet_points`], for a request that must carry a radius.
pub async fn find_records_for_location(
    ctx: &SearchContext,
    request: &SearchRequest,
    point_type: PointType,
) -> anyhow::Result<Vec<OccurrencePoint>> {
    if !matches!(request.spatial, Some(SpatialFilter::Radius { .. })) {
        return Err(SearchError::invalid_request("location search needs a latitude, longitude and radius").into());
    }
    facet_points(ctx, request, point_type).await
}

/// Writes one `latitude,longitude` row per distinct point.
pub async fn write_coordinates_to_stream(ctx: &SearchContext, request: &SearchRequest, sink: &mut dyn RowSink) -> anyhow::Result<u64> {
    let facet = facet_values(ctx, request, &ctx.config.point_field).await?;
    let mut written = 0u64;
    for item in &facet.facet_values {
        let Some((lat, lon)) = parse_point(&item.original_value.to_string()) else {
            continue;
        };
        sink.write_row(&[lat.to_string(), lon.to_string()]).await?;
        written += 1;
    }
    sink.flush().await?;
    Ok(written)
}
