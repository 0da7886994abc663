//! Index and lookup-table access.

pub mod index_client;
pub mod memory_index;
pub mod manticore_utils;
pub mod clickhouse_utils;
pub mod qid_store;
