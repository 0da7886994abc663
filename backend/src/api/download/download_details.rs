//! Progress and outcome of one download, shared with whoever reports on it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct DownloadDetails {
    total_records: AtomicU64,
    records_written: AtomicU64,
    pages_fetched: AtomicU64,
    truncated: AtomicBool,
    failed: AtomicBool,
    failure: Mutex<Option<String>>,
    cancel: CancellationToken,
}

impl DownloadDetails {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops dispatching further pages; pages already in flight still get written.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn set_total_records(&self, total: u64) {
        self.total_records.store(total, Ordering::Relaxed);
    }

    pub fn total_records(&self) -> u64 {
        self.total_records.load(Ordering::Relaxed)
    }

    pub fn add_written(&self, n: u64) {
        self.records_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn page_fetched(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched.load(Ordering::Relaxed)
    }

    pub fn mark_truncated(&self) {
        self.truncated.store(true, Ordering::Relaxed);
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated.load(Ordering::Relaxed)
    }

    pub fn mark_failed(&self, message: impl Into<String>) {
        self.failed.store(true, Ordering::Relaxed);
        *self.failure.lock() = Some(message.into());
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }
}
