use super::{FootageFile, FootageSearch, Orientation};
use crate::cancel::CancelFlag;
use crate::logw;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const PEXELS_BASE: &str = "https://api.pexels.com";
const UNSET_KEY_SENTINEL: &str = "your_pexels_api_key_here";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    #[serde(default)]
    video_files: Vec<PexelsVideoFile>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideoFile {
    link: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

fn files_from_response(body: &str) -> Result<Vec<FootageFile>> {
    let parsed: SearchResponse =
        serde_json::from_str(body).context("Failed to parse Pexels search response")?;
    Ok(parsed
        .videos
        .into_iter()
        .flat_map(|v| v.video_files)
        .map(|f| FootageFile {
            url: f.link,
            width: f.width.unwrap_or(0),
            height: f.height.unwrap_or(0),
        })
        .collect())
}

pub struct PexelsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PexelsClient {
    pub fn new(api_key: impl Into<String>, download_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(download_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self::with_client(client, api_key))
    }

    pub fn with_client(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: PEXELS_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl FootageSearch for PexelsClient {
    fn has_credentials(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && key != UNSET_KEY_SENTINEL
    }

    async fn search(
        &self,
        keyword: &str,
        orientation: Orientation,
        limit: u32,
    ) -> Result<Vec<FootageFile>> {
        let url = format!("{}/videos/search", self.base_url);
        let per_page = limit.to_string();
        let resp = self
            .client
            .get(&url)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", keyword),
                ("per_page", per_page.as_str()),
                ("orientation", orientation.as_str()),
            ])
            .send()
            .await
            .context("Pexels search request failed")?;

        let status = resp.status();
        if !status.is_success() {
            logw(format!("Pexels search HTTP {} for '{}'", status.as_u16(), keyword));
            anyhow::bail!("Pexels search HTTP {}", status.as_u16());
        }

        let body = resp.text().await.context("Pexels response read failed")?;
        files_from_response(&body)
    }

    async fn download(&self, url: &str, dest: &Path, cancel: &CancelFlag) -> Result<u64> {
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .context("Pexels download request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("download HTTP {} for {}", resp.status().as_u16(), url);
        }

        let mut out = fs::File::create(dest)
            .await
            .with_context(|| format!("create download target: {}", dest.display()))?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await.context("download stream failed")? {
            if cancel.is_cancelled() {
                anyhow::bail!("download cancelled");
            }
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;

        if written == 0 {
            anyhow::bail!("download returned an empty body: {}", url);
        }
        Ok(written)
    }
}
