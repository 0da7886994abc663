//! Image service lookups for occurrence records.

use std::collections::HashMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;

pub type ImageMetadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Serialize)]
struct FindImagesRequest<'a> {
    key: &'a str,
    values: &'a [String],
}

#[derive(Debug, Deserialize)]
struct FindImagesResponse {
    #[serde(default)]
    images: HashMap<String, Vec<ImageMetadata>>,
}

pub struct ImageMetadataClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl ImageMetadataClient {
    pub fn new(config: &SearchConfig) -> Self {
        let base_url = config
            .image_service_url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        Self { http: reqwest::Client::new(), base_url }
    }

    pub fn url_for(&self, image_id: &str) -> Option<String> {
        self.base_url.as_ref().map(|base| format!("{}/ws/image/{}", base, image_id))
    }

    /// Image metadata keyed by occurrence id. Empty when the service is not
    /// configured or answers with anything but a JSON 200.
    pub async fn image_metadata_for_occurrences(&self, occurrence_ids: &[String]) -> anyhow::Result<HashMap<String, Vec<ImageMetadata>>> {
        let Some(base) = &self.base_url else {
            return Ok(HashMap::new());
        };
        if occurrence_ids.is_empty() {
            return Ok(HashMap::new());
        }
        tracing::debug!("retrieving image metadata for {} records", occurrence_ids.len());
        let response = self
            .http
            .post(format!("{}/ws/findImagesByMetadata", base))
            .json(&FindImagesRequest { key: "occurrenceid", values: occurrence_ids })
            .send()
            .await
            .context("image service request failed")?;
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if response.status() != reqwest::StatusCode::OK || !is_json {
            tracing::warn!("image service answered {} without JSON", response.status());
            return Ok(HashMap::new());
        }
        let body = response.json::<FindImagesResponse>().await?;
        tracing::debug!("obtained image metadata for {} records", body.images.len());
        Ok(body.images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_service_is_empty() {
        let client = ImageMetadataClient::new(&SearchConfig::default());
        assert_eq!(client.url_for("abc"), None);
        let images = client.image_metadata_for_occurrences(&["r1".to_string()]).await.unwrap();
        assert!(images.is_empty());
    }

    #[test]
    fn image_urls_use_the_service_base() {
        let mut config = SearchConfig::default();
        config.image_service_url = Some("https://images.example.org/".to_string());
        let client = ImageMetadataClient::new(&config);
        assert_eq!(client.url_for("abc").as_deref(), Some("https://images.example.org/ws/image/abc"));
    }
}
