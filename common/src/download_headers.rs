//! Column headers of a bulk download.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DownloadHeaders {
    /// Index field names in output order.
    pub fields: Vec<String>,
    /// Display labels, same order as `fields`.
    pub labels: Vec<String>,
}
