//! Occurrence search backend: query building, index access, aggregation and bulk downloads.

pub mod config;
pub mod error;
pub mod context;
pub mod db_utils;
pub mod api;
pub mod cache;
pub mod services;

pub use config::SearchConfig;
pub use context::SearchContext;
pub use error::SearchError;
