//! Runtime settings, read from the environment with fallbacks.

use std::time::Duration;

use common::search_result::POINT_FIELD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry, doubled on every further attempt.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub manticore_url: String,
    pub manticore_table: String,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: String,
    pub clickhouse_password: String,
    pub cache_responses: bool,

    pub download_page_size: u64,
    pub download_max_records: u64,
    pub retry: RetryPolicy,
    pub default_download_fields: Vec<String>,
    pub sensitive_fields: Vec<String>,

    pub legend_default_buckets: usize,
    pub facet_default_limit: i64,
    pub default_facets: Vec<String>,
    /// Candidate fields for facet listing.
    pub facetable_fields: Vec<String>,
    pub numeric_fields: Vec<String>,
    pub max_clause_count_fallback: usize,

    pub point_field: String,
    pub data_source_field: String,
    pub data_provider_field: String,
    pub species_field: String,
    pub species_group_field: String,
    pub taxon_left_field: String,

    pub image_service_url: Option<String>,
    pub apikey_check_url: String,
    pub apikey_check_enabled: bool,
    pub ratelimit_network_include: Vec<String>,
    pub ratelimit_network_exclude: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            manticore_url: "http://127.0.0.1:9308".to_string(),
            manticore_table: "occurrences".to_string(),
            clickhouse_url: "http://localhost:8123".to_string(),
            clickhouse_database: "biocache".to_string(),
            clickhouse_user: "biocache".to_string(),
            clickhouse_password: "biocache".to_string(),
            cache_responses: false,

            download_page_size: 500,
            download_max_records: 500_000,
            retry: RetryPolicy { max_retries: 3, backoff: Duration::from_millis(200) },
            default_download_fields: list(&[
                "id",
                "data_resource_uid",
                "scientific_name",
                "latitude",
                "longitude",
                "year",
            ]),
            sensitive_fields: list(&["sensitive_latitude", "sensitive_longitude", "sensitive_locality"]),

            legend_default_buckets: common::search_const::DEFAULT_LEGEND_BUCKETS,
            facet_default_limit: 30,
            default_facets: list(&[
                "taxon_name",
                "rank",
                "common_name",
                "species_group",
                "data_resource_uid",
                "state",
                "year",
                "basis_of_record",
            ]),
            facetable_fields: list(&[
                "taxon_name",
                "rank",
                "common_name",
                "species_group",
                "species_guid",
                "genus",
                "family",
                "kingdom",
                "data_resource_uid",
                "data_provider_uid",
                "state",
                "year",
                "month",
                "decade",
                "basis_of_record",
            ]),
            numeric_fields: list(&[
                "year",
                "month",
                "decade",
                "latitude",
                "longitude",
                "coordinate_uncertainty",
                "elevation",
                "lft",
                "rgt",
            ]),
            max_clause_count_fallback: 1024,

            point_field: POINT_FIELD.to_string(),
            data_source_field: "data_resource_uid".to_string(),
            data_provider_field: "data_provider_uid".to_string(),
            species_field: "species_guid".to_string(),
            species_group_field: "species_group".to_string(),
            taxon_left_field: "lft".to_string(),

            image_service_url: None,
            apikey_check_url: "https://auth.ala.org.au/apikey/ws/check?apikey=".to_string(),
            apikey_check_enabled: true,
            ratelimit_network_include: list(&["0.0.0.0/0"]),
            ratelimit_network_exclude: Vec::new(),
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            manticore_url: env_or("MANTICORE_URL", d.manticore_url),
            manticore_table: env_or("MANTICORE_TABLE", d.manticore_table),
            clickhouse_url: env_or("CLICKHOUSE_URL", d.clickhouse_url),
            clickhouse_database: env_or("CLICKHOUSE_DATABASE", d.clickhouse_database),
            clickhouse_user: env_or("CLICKHOUSE_USER", d.clickhouse_user),
            clickhouse_password: env_or("CLICKHOUSE_PASSWORD", d.clickhouse_password),
            cache_responses: env_parse("SEARCH_RESPONSE_CACHE", d.cache_responses),

            download_page_size: env_parse("DOWNLOAD_PAGE_SIZE", d.download_page_size).max(1),
            download_max_records: env_parse("DOWNLOAD_MAX_RECORDS", d.download_max_records),
            retry: RetryPolicy {
                max_retries: env_parse("DOWNLOAD_MAX_RETRIES", d.retry.max_retries),
                backoff: Duration::from_millis(env_parse(
                    "DOWNLOAD_RETRY_BACKOFF_MS",
                    d.retry.backoff.as_millis() as u64,
                )),
            },
            default_download_fields: env_list("DOWNLOAD_DEFAULT_FIELDS", d.default_download_fields),
            sensitive_fields: env_list("SENSITIVE_FIELDS", d.sensitive_fields),

            legend_default_buckets: env_parse("LEGEND_DEFAULT_BUCKETS", d.legend_default_buckets).max(1),
            facet_default_limit: env_parse("FACET_DEFAULT_LIMIT", d.facet_default_limit),
            default_facets: env_list("DEFAULT_FACETS", d.default_facets),
            facetable_fields: env_list("FACETABLE_FIELDS", d.facetable_fields),
            numeric_fields: env_list("NUMERIC_FIELDS", d.numeric_fields),
            max_clause_count_fallback: env_parse("MAX_CLAUSE_COUNT_FALLBACK", d.max_clause_count_fallback),

            point_field: env_or("POINT_FIELD", d.point_field),
            data_source_field: env_or("DATA_SOURCE_FIELD", d.data_source_field),
            data_provider_field: env_or("DATA_PROVIDER_FIELD", d.data_provider_field),
            species_field: env_or("SPECIES_FIELD", d.species_field),
            species_group_field: env_or("SPECIES_GROUP_FIELD", d.species_group_field),
            taxon_left_field: env_or("TAXON_LEFT_FIELD", d.taxon_left_field),

            image_service_url: std::env::var("IMAGE_SERVICE_URL").ok().filter(|u| !u.trim().is_empty()),
            apikey_check_url: env_or("APIKEY_CHECK_URL", d.apikey_check_url),
            apikey_check_enabled: env_parse("APIKEY_CHECK_ENABLED", d.apikey_check_enabled),
            ratelimit_network_include: env_list("RATELIMIT_NETWORK_INCLUDE", d.ratelimit_network_include),
            ratelimit_network_exclude: env_list("RATELIMIT_NETWORK_EXCLUDE", d.ratelimit_network_exclude),
        }
    }

    pub fn is_numeric_field(&self, field: &str) -> bool {
        self.numeric_fields.iter().any(|f| f == field)
    }
}

fn list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("ignoring unparsable {}={:?}", name, value);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_list(name: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(name) {
        Ok(value) => value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let retry = RetryPolicy { max_retries: 3, backoff: Duration::from_millis(10) };
        assert_eq!(retry.delay_for(0), Duration::from_millis(10));
        assert_eq!(retry.delay_for(2), Duration::from_millis(40));
    }

    #[test]
    fn defaults_know_numeric_fields() {
        let config = SearchConfig::default();
        assert!(config.is_numeric_field("year"));
        assert!(!config.is_numeric_field("scientific_name"));
        assert_eq!(config.point_field, "lat_long");
    }
}
