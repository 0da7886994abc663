mod support;

use std::sync::Arc;

use backend::api::aggregation::{
    bounding_box, breakdown, colour_slots, colours, heatmap, legend, occurrence_counts_for_taxa, search_grouped_facets,
    search_pivot, search_stat,
};
use backend::api::aggregation::MAX_GRID_SIZE;
use backend::cache::label_cache::{LabelCache, StaticLabelSource, TermLabel};
use backend::cache::refresh_caches;
use common::legend::LegendBucket;
use common::search_const::OTHER_LABEL;
use common::search_query::{BoundingBox, SearchRequest};
use common::search_result::{Document, FacetValue, FieldValue};
use common::taxon_breakdown::TaxonRange;

use support::{config, context_with, occurrence};

const STATES: [&str; 3] = ["NSW", "VIC", "QLD"];

fn year_documents() -> Vec<Document> {
    (1900..=2020)
        .map(|year| {
            let i = (year - 1900) as usize;
            let mut doc = occurrence(format!("y{}", year), "dr1", "Macropus", -34.0, 151.0)
                .with_field("state", FieldValue::Str(STATES[i % 3].to_string()))
                .with_field("lft", FieldValue::Int(i as i64));
            doc.year = Some(year);
            doc
        })
        .collect()
}

#[tokio::test]
async fn year_legend_has_ten_equal_buckets_covering_the_range() {
    let (ctx, index) = context_with(year_documents(), config(100));
    let items = legend(&ctx, &SearchRequest::default(), "year", None, false).await.unwrap();

    assert_eq!(items.len(), 10);
    assert_eq!(items[0].name, "1900 - 1912");
    assert_eq!(items[9].name, "2008 - 2020");
    let mut previous_max = None;
    for (i, item) in items.iter().enumerate() {
        let LegendBucket::Range { min, max, max_inclusive } = item.bucket else {
            panic!("expected a range bucket");
        };
        assert_eq!(max - min, 12.0);
        assert_eq!(max_inclusive, i == 9);
        if let Some(previous) = previous_max {
            assert_eq!(min, previous);
        }
        previous_max = Some(max);
        assert_eq!(item.colour_index, i % colour_slots());
    }
    assert_eq!(items.iter().map(|i| i.count).sum::<u64>(), 121);
    assert_eq!(items[9].count, 13);

    // cut-points are cached: the second legend only runs the bucket counts
    let before = index.executed_queries().len();
    let again = legend(&ctx, &SearchRequest::default(), "year", None, false).await.unwrap();
    assert_eq!(again, items);
    assert_eq!(index.executed_queries().len() - before, 10);

    refresh_caches(&ctx).await.unwrap();
    let before = index.executed_queries().len();
    legend(&ctx, &SearchRequest::default(), "year", None, false).await.unwrap();
    assert_eq!(index.executed_queries().len() - before, 11);
}

#[tokio::test]
async fn explicit_cutpoints_are_sorted_and_empty_results_give_no_items() {
    let (ctx, _) = context_with(year_documents(), config(100));
    let items = legend(&ctx, &SearchRequest::default(), "year", Some(&[2000.0, 1950.0, 1900.0]), false).await.unwrap();
    assert_eq!(items.iter().map(|i| (i.name.as_str(), i.count)).collect::<Vec<_>>(), vec![("1900 - 1950", 50), ("1950 - 2000", 51)]);

    let nothing = SearchRequest::new("genus:Vombatus");
    assert!(legend(&ctx, &nothing, "year", None, false).await.unwrap().is_empty());
    assert!(legend(&ctx, &nothing, "state", None, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn discrete_legend_translates_unless_skipped() {
    let (ctx, _) = context_with(year_documents(), config(100));
    let labels = LabelCache::new(Arc::new(StaticLabelSource::new(vec![TermLabel {
        field: "state".to_string(),
        term: "NSW".to_string(),
        label: "New South Wales".to_string(),
    }])));
    labels.refresh().await.unwrap();
    let ctx = ctx.with_labels(labels);

    let items = legend(&ctx, &SearchRequest::default(), "state", None, false).await.unwrap();
    assert_eq!(items[0].name, "New South Wales");
    assert_eq!(items[0].count, 41);
    assert_eq!(items[0].bucket, LegendBucket::Value(FacetValue::from("NSW")));
    let raw = legend(&ctx, &SearchRequest::default(), "state", None, true).await.unwrap();
    assert_eq!(raw[0].name, "NSW");
}

#[tokio::test]
async fn colours_fold_the_tail_into_other() {
    let docs = (0..40)
        .map(|i| occurrence(i.to_string(), "dr1", "Macropus", -34.0, 151.0).with_field("basis", FieldValue::Str(format!("b{:02}", i % 20))))
        .collect();
    let (ctx, _) = context_with(docs, config(100));
    let items = colours(&ctx, &SearchRequest::default(), "basis", None, true).await.unwrap();
    assert_eq!(items.len(), colour_slots() + 1);
    let other = items.last().unwrap();
    assert_eq!(other.name, OTHER_LABEL);
    assert_eq!(other.count, 2 * (20 - colour_slots() as u64));
    assert_eq!(items.iter().map(|i| i.count).sum::<u64>(), 40);

    let grid = colours(&ctx, &SearchRequest::default(), "grid", None, false).await.unwrap();
    assert_eq!(grid.len(), 1);
    assert_eq!(grid[0].count, 40);
}

fn spread_documents() -> Vec<Document> {
    let mut docs = Vec::new();
    for i in 0..60 {
        let lat = -35.0 + (i % 10) as f64 * 0.2;
        let lon = 150.0 + (i / 10) as f64 * 0.4;
        docs.push(occurrence(i.to_string(), "dr1", "Macropus", lat, lon).with_field("state", FieldValue::Str(STATES[i % 3].to_string())));
    }
    // corners and a point outside the box
    docs.push(occurrence("ne", "dr1", "Macropus", -33.0, 152.0).with_field("state", FieldValue::Str("NSW".into())));
    docs.push(occurrence("sw", "dr1", "Macropus", -35.0, 150.0).with_field("state", FieldValue::Str("NSW".into())));
    docs.push(occurrence("out", "dr1", "Macropus", -20.0, 130.0).with_field("state", FieldValue::Str("NSW".into())));
    docs
}

#[tokio::test]
async fn heatmap_cells_are_dense_and_sum_to_the_total() {
    let (ctx, _) = context_with(spread_documents(), config(100));
    let bbox = BoundingBox::new(150.0, -35.0, 152.0, -33.0);
    for grid_size in [1, 3, 4, 7] {
        let dto = heatmap(&ctx, &SearchRequest::default(), bbox, None, grid_size).await.unwrap();
        assert_eq!(dto.layers.len(), 1);
        let layer = &dto.layers[0];
        assert_eq!(layer.cells.len(), (grid_size * grid_size) as usize);
        assert_eq!(layer.total_count(), 62);
        assert_eq!(layer.cells.last().unwrap().row, grid_size - 1);
    }

    let states = legend(&ctx, &SearchRequest::default(), "state", None, true).await.unwrap();
    let dto = heatmap(&ctx, &SearchRequest::default(), bbox, Some(states.as_slice()), 5).await.unwrap();
    assert_eq!(dto.layers.len(), 3);
    let nsw = dto.layers.iter().find(|l| l.label.as_deref() == Some("NSW")).unwrap();
    assert_eq!(nsw.total_count(), 22);
    assert_eq!(nsw.colour.as_deref(), Some(states[0].colour.as_str()));
}

#[tokio::test]
async fn heatmap_from_colours_keeps_the_other_bucket() {
    let docs = (0..30)
        .map(|i| {
            let lat = -35.0 + (i % 6) as f64 * 0.3;
            let lon = 150.0 + (i / 6) as f64 * 0.4;
            occurrence(i.to_string(), "dr1", "Macropus", lat, lon).with_field("basis", FieldValue::Str(format!("b{:02}", i % 15)))
        })
        .collect();
    let (ctx, _) = context_with(docs, config(100));
    let bbox = BoundingBox::new(150.0, -35.0, 152.0, -33.0);
    let items = colours(&ctx, &SearchRequest::default(), "basis", None, true).await.unwrap();
    assert_eq!(items.len(), colour_slots() + 1);
    assert!(items.last().unwrap().fq.is_some());

    let dto = heatmap(&ctx, &SearchRequest::default(), bbox, Some(items.as_slice()), 4).await.unwrap();
    assert_eq!(dto.layers.len(), items.len());
    assert_eq!(dto.layers.iter().map(|l| l.total_count()).sum::<u64>(), 30);
    let other = dto.layers.last().unwrap();
    assert_eq!(other.label.as_deref(), Some(OTHER_LABEL));
    assert_eq!(other.total_count(), items.last().unwrap().count);

    // a legend item without a filter still takes the records the others leave out
    let mut partial = items[..3].to_vec();
    partial.push(common::legend::LegendItem { fq: None, ..items.last().unwrap().clone() });
    let dto = heatmap(&ctx, &SearchRequest::default(), bbox, Some(partial.as_slice()), 4).await.unwrap();
    assert_eq!(dto.layers.iter().map(|l| l.total_count()).sum::<u64>(), 30);
}

#[tokio::test]
async fn heatmap_rejects_degenerate_grids() {
    let (ctx, _) = context_with(spread_documents(), config(100));
    let bbox = BoundingBox::new(150.0, -35.0, 152.0, -33.0);
    assert!(heatmap(&ctx, &SearchRequest::default(), bbox, None, 0).await.is_err());
    assert!(heatmap(&ctx, &SearchRequest::default(), bbox, None, MAX_GRID_SIZE + 1).await.is_err());
    assert!(heatmap(&ctx, &SearchRequest::default(), bbox, None, u32::MAX).await.is_err());
    let flat = BoundingBox::new(150.0, -35.0, 150.0, -33.0);
    assert!(heatmap(&ctx, &SearchRequest::default(), flat, None, 4).await.is_err());
}

#[tokio::test]
async fn breakdown_sums_nested_ranges_independently() {
    let (ctx, _) = context_with(year_documents(), config(100));
    let taxa = vec![
        TaxonRange::new("Animalia", "kingdom", 0, 120),
        TaxonRange::new("Chordata", "phylum", 10, 59),
        TaxonRange::new("Mammalia", "class", 20, 29),
        TaxonRange::new("Aves", "class", 30, 39),
        TaxonRange::new("Insecta", "class", 500, 600),
    ];
    let counts = occurrence_counts_for_taxa(&ctx, &SearchRequest::default(), &taxa).await.unwrap();
    assert_eq!(counts.iter().map(|c| c.count).collect::<Vec<_>>(), vec![121, 50, 10, 10, 0]);

    let classes = breakdown(&ctx, &SearchRequest::default(), Some("class"), &taxa).await.unwrap();
    assert_eq!(classes.rank.as_deref(), Some("class"));
    assert_eq!(classes.taxa.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["Aves", "Mammalia"]);
}

#[tokio::test]
async fn pivot_nests_in_request_order() {
    let docs = (0..30)
        .map(|i| {
            occurrence(i.to_string(), "dr1", if i % 5 == 0 { "Vombatus" } else { "Macropus" }, -34.0, 151.0)
                .with_field("state", FieldValue::Str(if i < 20 { "NSW" } else { "VIC" }.to_string()))
        })
        .collect();
    let (ctx, _) = context_with(docs, config(100));
    let request = SearchRequest::default().with_facets(["state", "genus"]);
    let pivot = search_pivot(&ctx, &request).await.unwrap();

    assert_eq!(pivot.len(), 2);
    assert_eq!((pivot[0].value.clone(), pivot[0].count), (FacetValue::from("NSW"), 20));
    let nsw = &pivot[0].pivot;
    assert_eq!(nsw.iter().map(|p| (p.value.to_string(), p.count)).collect::<Vec<_>>(), vec![("Macropus".to_string(), 16), ("Vombatus".to_string(), 4)]);
    assert!(nsw.iter().all(|p| p.pivot.is_empty()));
    for parent in &pivot {
        assert_eq!(parent.pivot.iter().map(|p| p.count).sum::<u64>(), parent.count);
    }
}

#[tokio::test]
async fn grouped_facets_limit_groups_and_documents_separately() {
    let (ctx, _) = context_with(year_documents(), config(100));
    let mut request = SearchRequest::default().with_facets(["state"]);
    request.flimit = Some(2);
    request.page_size = 3;
    let grouped = search_grouped_facets(&ctx, &request).await.unwrap();
    assert_eq!(grouped.len(), 1);
    let groups = &grouped[0].groups;
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].count, 41);
    assert!(groups.iter().all(|g| g.documents.len() == 3));
    assert!(groups[0].documents.iter().all(|d| d.get("state") == Some(FieldValue::Str(groups[0].value.to_string()))));
}

#[tokio::test]
async fn stats_per_facet_value_and_bounding_box() {
    let (ctx, _) = context_with(year_documents(), config(100));
    let overall = search_stat(&ctx, &SearchRequest::default(), "year", None).await.unwrap();
    assert_eq!(overall.len(), 1);
    assert_eq!((overall[0].min, overall[0].max, overall[0].count), (1900.0, 2020.0, 121));
    assert_eq!(overall[0].mean, 1960.0);

    let by_state = search_stat(&ctx, &SearchRequest::default(), "year", Some("state")).await.unwrap();
    assert_eq!(by_state.len(), 3);
    assert_eq!(by_state.iter().map(|s| s.count).sum::<u64>(), 121);
    assert_eq!(by_state[0].facet_value, Some(FacetValue::from("NSW")));

    let (ctx, _) = context_with(spread_documents(), config(100));
    let bbox = bounding_box(&ctx, &SearchRequest::default()).await.unwrap().unwrap();
    assert_eq!(bbox, BoundingBox::new(130.0, -35.0, 152.0, -20.0));
    assert_eq!(bounding_box(&ctx, &SearchRequest::new("genus:Vombatus")).await.unwrap(), None);
}
