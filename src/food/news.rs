use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

#[async_trait]
pub trait NewsFeed: Send + Sync {
    async fn latest(&self) -> anyhow::Result<serde_json::Value>;
}

/// News articles fetched from an external JSON feed and returned verbatim.
pub struct HttpNewsFeed {
    http: reqwest::Client,
    url: String,
}

impl HttpNewsFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build news http client")?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NewsFeed for HttpNewsFeed {
    async fn latest(&self) -> anyhow::Result<serde_json::Value> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("fetch news feed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("news feed returned HTTP {}: {}", status, body);
        }

        response.json().await.context("news feed is not JSON")
    }
}
