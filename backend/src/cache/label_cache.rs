//! Facet label translations and computed legend cut-points.
//!
//! Readers clone an `Arc` of the current snapshot; writers build a complete new
//! snapshot and replace the pointer in one store, so a reader never observes a
//! half-loaded table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::search_result::FacetResult;
use parking_lot::{Mutex, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermLabel {
    pub field: String,
    pub term: String,
    pub label: String,
}

#[async_trait]
pub trait LabelSource: Send + Sync {
    async fn load_labels(&self) -> anyhow::Result<Vec<TermLabel>>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticLabelSource {
    labels: Vec<TermLabel>,
}

impl StaticLabelSource {
    pub fn new(labels: Vec<TermLabel>) -> Self {
        Self { labels }
    }
}

#[async_trait]
impl LabelSource for StaticLabelSource {
    async fn load_labels(&self) -> anyhow::Result<Vec<TermLabel>> {
        Ok(self.labels.clone())
    }
}

#[derive(Debug, Default)]
pub struct LabelSnapshot {
    labels: Arc<HashMap<String, HashMap<String, String>>>,
    cutpoints: HashMap<String, Vec<f64>>,
    loaded_at: Option<Instant>,
    /// Bumped by every successful refresh.
    generation: u64,
}

impl LabelSnapshot {
    fn from_labels(labels: Vec<TermLabel>, generation: u64) -> Self {
        let mut by_field: HashMap<String, HashMap<String, String>> = HashMap::new();
        for TermLabel { field, term, label } in labels {
            by_field.entry(field).or_default().insert(term, label);
        }
        Self { labels: Arc::new(by_field), cutpoints: HashMap::new(), loaded_at: Some(Instant::now()), generation }
    }

    pub fn label(&self, field: &str, term: &str) -> Option<&str> {
        self.labels.get(field)?.get(term).map(String::as_str)
    }

    pub fn label_count(&self) -> usize {
        self.labels.values().map(HashMap::len).sum()
    }

    pub fn loaded_at(&self) -> Option<Instant> {
        self.loaded_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Clone)]
pub struct LabelCache {
    source: Arc<dyn LabelSource>,
    current: Arc<RwLock<Arc<LabelSnapshot>>>,
    /// Serialises snapshot replacement; never held across an await.
    write_lock: Arc<Mutex<()>>,
}

impl LabelCache {
    pub fn new(source: Arc<dyn LabelSource>) -> Self {
        Self {
            source,
            current: Arc::new(RwLock::new(Arc::new(LabelSnapshot::default()))),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn empty() -> Self {
        Self::new(Arc::new(StaticLabelSource::default()))
    }

    pub fn snapshot(&self) -> Arc<LabelSnapshot> {
        self.current.read().clone()
    }

    /// Display label of `term`, or `term` itself when there is none.
    pub fn translate(&self, field: &str, term: &str) -> String {
        self.snapshot().label(field, term).unwrap_or(term).to_string()
    }

    pub fn translate_facet(&self, facet: &mut FacetResult) {
        let snapshot = self.snapshot();
        for item in &mut facet.facet_values {
            let term = item.original_value.to_string();
            if let Some(label) = snapshot.label(&facet.facet_field, &term) {
                item.display_string = label.to_string();
            }
        }
    }

    pub fn cached_cutpoints(&self, key: &str) -> Option<Vec<f64>> {
        self.snapshot().cutpoints.get(key).cloned()
    }

    /// Caches cut-points computed against the snapshot of `generation`.
    /// Returns false, storing nothing, when a refresh has replaced that
    /// snapshot in the meantime.
    pub fn store_cutpoints(&self, key: String, cutpoints: Vec<f64>, generation: u64) -> bool {
        let _guard = self.write_lock.lock();
        let old = self.snapshot();
        if old.generation != generation {
            tracing::debug!("dropping cut-points for {} computed before a label refresh", key);
            return false;
        }
        let mut cutpoints_map = old.cutpoints.clone();
        cutpoints_map.insert(key, cutpoints);
        let next = LabelSnapshot {
            labels: Arc::clone(&old.labels),
            cutpoints: cutpoints_map,
            loaded_at: old.loaded_at,
            generation: old.generation,
        };
        *self.current.write() = Arc::new(next);
        true
    }

    /// Reloads every label from the source and drops cached cut-points.
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> anyhow::Result<usize> {
        let t0 = Instant::now();
        let labels = match self.source.load_labels().await {
            Ok(labels) => labels,
            Err(e) => {
                tracing::error!("label cache refresh failed, keeping previous snapshot: {:#}", e);
                return Err(e);
            }
        };
        let count = {
            let _guard = self.write_lock.lock();
            let next = LabelSnapshot::from_labels(labels, self.snapshot().generation + 1);
            let count = next.label_count();
            *self.current.write() = Arc::new(next);
            count
        };
        tracing::info!("label cache refreshed: {} labels in {}ms", count, t0.elapsed().as_millis());
        Ok(count)
    }

    /// Refreshes on a fixed interval until the returned task is aborted.
    pub fn spawn_periodic_refresh(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let _ = cache.refresh().await;
            }
        })
    }
}

impl std::fmt::Debug for LabelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelCache").field("labels", &self.snapshot().label_count()).finish()
    }
}
