//! HTTP client for the target shop frontend

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Client for one virtual user
///
/// Each instance keeps its own cookie jar, so a user's session (currency,
/// cart) survives across its requests.
pub struct TargetClient {
    client: Client,
    base_url: Url,
}

impl TargetClient {
    pub fn new(host: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(host).with_context(|| format!("Invalid target host `{host}`"))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET `path`, failing on a non-success status
    pub async fn get(&self, path: &str) -> Result<()> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;

        check_status("GET", path, response).await
    }

    /// POST a urlencoded form to `path`, failing on a non-success status
    pub async fn post_form<F: Serialize + ?Sized>(&self, path: &str, form: &F) -> Result<()> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .with_context(|| format!("POST {path} failed"))?;

        check_status("POST", path, response).await
    }
}

async fn check_status(method: &str, path: &str, response: reqwest::Response) -> Result<()> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("{} {} returned {}: {}", method, path, status, body.trim());
    }
    Ok(())
}
