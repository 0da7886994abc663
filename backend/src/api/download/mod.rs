//! Bulk downloads: the result streamer and the state it shares with callers.

pub mod download_details;
pub mod row_sink;
pub mod uid_stats;
pub mod worker_pool;

mod stream_download;
pub use stream_download::{DownloadResult, HEADER_LABEL_FIELD, stream_download};
