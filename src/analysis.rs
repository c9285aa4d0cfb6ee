use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Nutrition estimate produced by the analysis service. Opaque to this
/// crate and handed back to clients exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NutritionEstimate(pub serde_json::Value);

#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze(&self, image: Bytes, content_type: &str) -> anyhow::Result<NutritionEstimate>;
}

/// Analysis service reached over HTTP: the raw image is POSTed and a JSON
/// object comes back.
pub struct HttpAnalysisClient {
    http: reqwest::Client,
    url: String,
}

impl HttpAnalysisClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build analysis http client")?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    async fn analyze(&self, image: Bytes, content_type: &str) -> anyhow::Result<NutritionEstimate> {
        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(image)
            .send()
            .await
            .context("send image to analysis service")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("analysis service returned HTTP {}: {}", status, body);
        }

        let value: serde_json::Value = response
            .json()
            .await
            .context("analysis response is not JSON")?;
        parse_estimate(value)
    }
}

fn parse_estimate(value: serde_json::Value) -> anyhow::Result<NutritionEstimate> {
    anyhow::ensure!(value.is_object(), "analysis response is not a JSON object");
    Ok(NutritionEstimate(value))
}
