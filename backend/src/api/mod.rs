pub mod aggregation;
pub mod download;
pub mod search;
