use super::{ClipHandle, ClipQuery, ClipSource};
use crate::api::{FootageSearch, Orientation, best_footage_file};
use crate::cancel::CancelFlag;
use crate::engine::MediaEngine;
use crate::error::SourceError;
use crate::{logi, logok, logw};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

/// Keyword search against a remote footage provider, backed by an on-disk
/// cache shared across runs.
pub struct RemoteSearchSource {
    search: Arc<dyn FootageSearch>,
    engine: Arc<dyn MediaEngine>,
    cache_dir: PathBuf,
    search_timeout: Duration,
    download_timeout: Duration,
    per_page: u32,
    cancel: CancelFlag,
}

/// Cache file name for a keyword.
pub fn cache_file_name(keyword: &str) -> String {
    let stem: String = keyword
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect();
    format!("{stem}.mp4")
}

impl RemoteSearchSource {
    pub fn new(
        search: Arc<dyn FootageSearch>,
        engine: Arc<dyn MediaEngine>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            search,
            engine,
            cache_dir: cache_dir.into(),
            search_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(60),
            per_page: 5,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_timeouts(mut self, search: Duration, download: Duration) -> Self {
        self.search_timeout = search;
        self.download_timeout = download;
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cache_path(&self, keyword: &str) -> PathBuf {
        self.cache_dir.join(cache_file_name(keyword))
    }

    async fn probe_cached(&self, path: &Path) -> Option<ClipHandle> {
        if !path.is_file() {
            return None;
        }
        match self.engine.probe(path).await {
            Ok(handle) => Some(handle),
            Err(err) => {
                logw(format!("Cached clip {} unreadable ({}); refetching", path.display(), err));
                None
            }
        }
    }

    /// Cache hit, or search + download + atomic insert into the cache.
    pub async fn fetch(&self, keyword: &str) -> Result<Option<ClipHandle>, SourceError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(None);
        }

        let cached = self.cache_path(keyword);
        if let Some(handle) = self.probe_cached(&cached).await {
            logok(format!("Using cached footage for '{}': {}", keyword, cached.display()));
            return Ok(Some(handle));
        }

        if !self.search.has_credentials() {
            return Err(SourceError::MissingCredentials);
        }
        if self.cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }

        logi(format!("Searching footage for '{}'", keyword));
        let files = timeout(
            self.search_timeout,
            self.search.search(keyword, Orientation::Portrait, self.per_page),
        )
        .await
        .map_err(|_| SourceError::Timeout {
            operation: "search",
            limit: self.search_timeout,
        })?
        .map_err(|e| SourceError::Search(e.to_string()))?;

        let Some(best) = best_footage_file(&files) else {
            logw(format!("No footage found for '{}'", keyword));
            return Ok(None);
        };
        logi(format!(
            "Downloading {}x{} footage for '{}'",
            best.width, best.height, keyword
        ));

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let tmp = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(&self.cache_dir)?
            .into_temp_path();

        timeout(
            self.download_timeout,
            self.search.download(&best.url, &tmp, &self.cancel),
        )
        .await
        .map_err(|_| SourceError::Timeout {
            operation: "download",
            limit: self.download_timeout,
        })?
        .map_err(|e| {
            if self.cancel.is_cancelled() {
                SourceError::Cancelled
            } else {
                SourceError::Download(e.to_string())
            }
        })?;

        tmp.persist(&cached).map_err(|e| SourceError::Io(e.error))?;

        let handle = self
            .engine
            .probe(&cached)
            .await
            .map_err(|e| SourceError::Probe {
                path: cached.clone(),
                reason: e.to_string(),
            })?;
        logok(format!("Footage cached: {}", cached.display()));
        Ok(Some(handle))
    }

    /// Warms the cache for several keywords concurrently. Returns how many
    /// keywords ended up with a usable cached clip.
    pub async fn prefetch(self: &Arc<Self>, keywords: &[String], concurrency: usize) -> usize {
        let distinct: BTreeSet<String> = keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if distinct.is_empty() {
            return 0;
        }

        let permits = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for keyword in distinct {
            let this = Arc::clone(self);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                if this.cancel.is_cancelled() {
                    return None;
                }
                match this.fetch(&keyword).await {
                    Ok(found) => found,
                    Err(err) => {
                        logw(format!("Prefetch for '{}' failed: {}", keyword, err));
                        None
                    }
                }
            });
        }

        let mut ready = 0;
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(_)) = joined {
                ready += 1;
            }
        }
        ready
    }
}

#[async_trait]
impl ClipSource for RemoteSearchSource {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn candidates(&self, query: &ClipQuery) -> Result<Vec<ClipHandle>, SourceError> {
        let Some(keyword) = query.keyword.as_deref() else {
            return Ok(Vec::new());
        };
        Ok(self.fetch(keyword).await?.into_iter().collect())
    }
}
