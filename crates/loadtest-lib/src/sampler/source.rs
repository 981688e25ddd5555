//! HTTP resource source for the cluster metrics API

use super::{async_trait, ResourceSource, SampleError};
use crate::models::PodResource;
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Build `{api_base}/clusters/{cluster_id}/pods/resources`
pub fn resources_url(api_base: &str, cluster_id: &str) -> Result<Url> {
    let mut url = Url::parse(api_base).with_context(|| format!("Invalid API base URL: {}", api_base))?;

    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("API base URL cannot have a path: {}", api_base))?
        .pop_if_empty()
        .extend(["clusters", cluster_id, "pods", "resources"]);

    Ok(url)
}

/// Fetches pod resources from the cluster metrics API
pub struct HttpResourceSource {
    client: Client,
    url: Url,
}

impl HttpResourceSource {
    /// Create a source for one cluster
    ///
    /// `fetch_timeout` bounds each request at the HTTP layer as well.
    pub fn new(api_base: &str, cluster_id: &str, fetch_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(fetch_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let url = resources_url(api_base, cluster_id)?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ResourceSource for HttpResourceSource {
    async fn fetch(&self) -> Result<Vec<PodResource>, SampleError> {
        let response = self.client.get(self.url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SampleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let resources: Vec<PodResource> = serde_json::from_slice(&body)?;

        debug!(url = %self.url, pods = resources.len(), "Fetched pod resources");
        Ok(resources)
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}
