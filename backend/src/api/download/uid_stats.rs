//! Per data-source record counters shared by concurrent page writers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct UidStats {
    counters: DashMap<String, AtomicU64>,
}

impl UidStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one to the counter of `uid`, creating it on first sight.
    pub fn increment(&self, uid: &str) -> u64 {
        if let Some(counter) = self.counters.get(uid) {
            return counter.fetch_add(1, Ordering::Relaxed) + 1;
        }
        self.counters
            .entry(uid.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed)
            + 1
    }

    pub fn get(&self, uid: &str) -> u64 {
        self.counters.get(uid).map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn total(&self) -> u64 {
        self.counters.iter().map(|c| c.value().load(Ordering::Relaxed)).sum()
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|c| (c.key().clone(), c.value().load(Ordering::Relaxed)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let stats = Arc::new(UidStats::new());
        let mut tasks = Vec::new();
        for t in 0..8 {
            let stats = stats.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..1000 {
                    stats.increment(if (i + t) % 2 == 0 { "dr1" } else { "dr2" });
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(stats.total(), 8000);
        assert_eq!(stats.get("dr1"), 4000);
        assert_eq!(stats.get("dr3"), 0);
    }
}
