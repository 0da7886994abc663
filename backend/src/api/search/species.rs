//! Species lists and per-species counts.

use common::search_query::{FilterClause, SearchRequest, SpatialFilter};
use common::taxon_breakdown::SpeciesCount;

use crate::api::download::row_sink::RowSink;
use crate::api::search::search_facets::facet_values;
use crate::context::SearchContext;
use crate::error::SearchError;

/// Species group that stands for every species.
pub const ALL_SPECIES: &str = "ALL_SPECIES";

/// Every species among the matching records with its record count, most
/// recorded first. Names come from the label table of the species field.
pub async fn find_all_species(ctx: &SearchContext, request: &SearchRequest) -> anyhow::Result<Vec<SpeciesCount>> {
    let field = &ctx.config.species_field;
    let facet = facet_values(ctx, request, field).await?;
    let snapshot = ctx.labels.snapshot();
    Ok(facet
        .facet_values
        .into_iter()
        .map(|item| {
            let guid = item.original_value.to_string();
            let name = snapshot.label(field, &guid).unwrap_or(&guid).to_string();
            SpeciesCount { guid, name, count: item.count }
        })
        .collect())
}

/// Writes `guid,name,count` for every species recorded inside the request's
/// radius, optionally restricted to one species group. Returns the number of
/// species written.
pub async fn write_species_count_by_circle_to_stream(
    ctx: &SearchContext,
    request: &SearchRequest,
    species_group: Option<&str>,
    sink: &mut dyn RowSink,
) -> anyhow::Result<u64> {
    if !matches!(request.spatial, Some(SpatialFilter::Radius { .. })) {
        return Err(SearchError::invalid_request("species count needs a latitude, longitude and radius").into());
    }
    let mut request = request.clone();
    if let Some(group) = species_group.map(str::trim).filter(|g| !g.is_empty() && *g != ALL_SPECIES) {
        request.filters.push(FilterClause::term(ctx.config.species_group_field.as_str(), group));
    }
    let species = find_all_species(ctx, &request).await?;

    sink.write_row(&["guid".to_string(), "name".to_string(), "count".to_string()]).await?;
    for item in &species {
        sink.write_row(&[item.guid.clone(), item.name.clone(), item.count.to_string()]).await?;
    }
    sink.flush().await?;
    tracing::debug!("{} species within radius for group {:?}", species.len(), species_group);
    Ok(species.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use common::search_result::{Document, FieldValue};

    use crate::api::download::row_sink::MemorySink;
    use crate::cache::label_cache::{LabelCache, StaticLabelSource, TermLabel};
    use crate::config::SearchConfig;
    use crate::db_utils::memory_index::MemoryIndex;

    fn record(id: usize, guid: &str, group: &str, lat: f64) -> Document {
        let mut doc = Document::new(id.to_string(), "dr1")
            .with_field("species_guid", FieldValue::Str(guid.to_string()))
            .with_field("species_group", FieldValue::Str(group.to_string()));
        doc.latitude = Some(lat);
        doc.longitude = Some(151.2);
        doc
    }

    async fn context() -> SearchContext {
        let mut docs = Vec::new();
        for i in 0..6 {
            docs.push(record(i, "urn:macropus-giganteus", "Mammals", -33.8));
        }
        for i in 6..9 {
            docs.push(record(i, "urn:dacelo-novaeguineae", "Birds", -33.8));
        }
        docs.push(record(9, "urn:vombatus-ursinus", "Mammals", -33.8));
        // outside a 10km circle
        docs.push(record(10, "urn:phascolarctos-cinereus", "Mammals", -35.3));
        let labels = LabelCache::new(Arc::new(StaticLabelSource::new(vec![TermLabel {
            field: "species_guid".to_string(),
            term: "urn:macropus-giganteus".to_string(),
            label: "Macropus giganteus".to_string(),
        }])));
        labels.refresh().await.unwrap();
        SearchContext::new(SearchConfig::default(), Arc::new(MemoryIndex::new(docs))).with_labels(labels)
    }

    #[tokio::test]
    async fn species_are_counted_and_named() {
        let ctx = context().await;
        let species = find_all_species(&ctx, &SearchRequest::default()).await.unwrap();
        assert_eq!(species.len(), 4);
        assert_eq!(species[0].name, "Macropus giganteus");
        assert_eq!(species[0].count, 6);
        assert_eq!(species[1].guid, "urn:dacelo-novaeguineae");
        assert_eq!(species[1].name, "urn:dacelo-novaeguineae");
    }

    #[tokio::test]
    async fn circle_counts_follow_the_species_group() {
        let ctx = context().await;
        let request = SearchRequest::default().with_radius(-33.8, 151.2, 10.0);

        let mut sink = MemorySink::new();
        let written = write_species_count_by_circle_to_stream(&ctx, &request, Some("Mammals"), &mut sink).await.unwrap();
        assert_eq!(written, 2);
        let rows = sink.rows();
        assert_eq!(rows[0], vec!["guid", "name", "count"]);
        assert_eq!(rows[1], vec!["urn:macropus-giganteus", "Macropus giganteus", "6"]);
        assert_eq!(rows[2], vec!["urn:vombatus-ursinus", "urn:vombatus-ursinus", "1"]);

        let mut sink = MemorySink::new();
        let written = write_species_count_by_circle_to_stream(&ctx, &request, Some(ALL_SPECIES), &mut sink).await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(sink.flush_count(), 1);

        let err = write_species_count_by_circle_to_stream(&ctx, &SearchRequest::default(), None, &mut MemorySink::new())
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<SearchError>(), Some(SearchError::InvalidRequest { .. })));
    }
}
