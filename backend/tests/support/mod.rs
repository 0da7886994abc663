#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use backend::SearchConfig;
use backend::SearchContext;
use backend::db_utils::memory_index::MemoryIndex;
use common::search_result::{Document, FieldValue};

pub const CENTRE: (f64, f64) = (-33.8, 151.2);

pub fn occurrence(id: impl Into<String>, source: &str, genus: &str, lat: f64, lon: f64) -> Document {
    let mut doc = Document::new(id, source).with_field("genus", FieldValue::Str(genus.to_string()));
    doc.scientific_name = Some(format!("{} sp.", genus));
    doc.latitude = Some(lat);
    doc.longitude = Some(lon);
    doc
}

/// 250 Macropus records near the centre, spread over four data sources,
/// plus records that must not match the download query.
pub fn macropus_documents() -> Vec<Document> {
    let mut docs = Vec::new();
    for i in 0..250 {
        let mut doc = occurrence(format!("m{:03}", i), &format!("dr{}", i % 4), "Macropus", CENTRE.0 + i as f64 * 0.0001, CENTRE.1);
        doc.year = Some(1990 + (i % 30) as i64);
        if i % 10 == 0 {
            doc.sensitive_latitude = Some(CENTRE.0 + 0.01234);
            doc.sensitive_longitude = Some(CENTRE.1 + 0.01234);
        }
        docs.push(doc);
        if i % 25 == 0 {
            docs.push(occurrence(format!("v{:03}", i), "dr9", "Vombatus", CENTRE.0, CENTRE.1));
            docs.push(occurrence(format!("far{:03}", i), "dr9", "Macropus", -35.3, 149.1));
        }
    }
    docs
}

pub fn config(page_size: u64) -> SearchConfig {
    let mut config = SearchConfig::default();
    config.download_page_size = page_size;
    config.retry.backoff = Duration::from_millis(1);
    config
}

pub fn context_with(docs: Vec<Document>, config: SearchConfig) -> (SearchContext, Arc<MemoryIndex>) {
    let index = Arc::new(MemoryIndex::new(docs));
    (SearchContext::new(config, index.clone()), index)
}
