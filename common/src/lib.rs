//! Common library exports shared between the search backend and its callers.

extern crate serde;


pub mod search_query;
pub mod search_result;
pub mod search_const;
pub mod legend;
pub mod heatmap;
pub mod facet_pivot;
pub mod taxon_breakdown;
pub mod download_headers;
