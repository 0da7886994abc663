//! Error taxonomy of the search backend.
//!
//! Operations return `anyhow::Result`; the typed variants below travel inside
//! the `anyhow::Error` and are recovered with `downcast_ref::<SearchError>()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    /// A `qid:` reference that the query-id store does not know.
    #[error("query id not found: {qid}")]
    QueryIdNotFound { qid: String },

    #[error("query too complex: {clauses} boolean clauses exceeds the maximum of {max}")]
    QueryTooComplex { clauses: usize, max: usize },

    /// Transient index failure; retried by the download streamer.
    #[error("index unavailable: {message}")]
    IndexUnavailable { message: String },

    /// A download aborted after `written` records were already flushed.
    #[error("download stream aborted after {written} records: {message}")]
    PartialStreamFailure { written: u64, message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl SearchError {
    pub fn index_unavailable(message: impl std::fmt::Display) -> Self {
        SearchError::IndexUnavailable { message: message.to_string() }
    }

    pub fn invalid_request(message: impl std::fmt::Display) -> Self {
        SearchError::InvalidRequest { message: message.to_string() }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::IndexUnavailable { .. })
    }
}

pub fn is_retryable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SearchError>().is_some_and(SearchError::is_retryable)
}
