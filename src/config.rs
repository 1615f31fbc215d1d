use crate::fitter::FitMode;
use crate::logw;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pexels_api_key: String,
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
    #[serde(default = "default_raw_videos_dir")]
    pub raw_videos_dir: PathBuf,
    #[serde(default = "default_videos_dir")]
    pub videos_dir: PathBuf,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_music_dir")]
    pub music_dir: PathBuf,
    #[serde(default)]
    pub use_remote: bool,
    #[serde(default = "default_true")]
    pub use_local: bool,
    #[serde(default = "default_true")]
    pub use_placeholder: bool,
    #[serde(default)]
    pub fit_mode: FitMode,
    #[serde(default = "default_crossfade")]
    pub crossfade_seconds: f64,
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_per_page")]
    pub search_per_page: u32,
    #[serde(default = "default_prefetch")]
    pub prefetch_concurrency: usize,
    #[serde(default = "default_music_volume")]
    pub music_volume: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_raw_videos_dir() -> PathBuf {
    PathBuf::from("pipeline/raw_videos")
}

fn default_videos_dir() -> PathBuf {
    PathBuf::from("pipeline/videos")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("pipeline/work")
}

fn default_music_dir() -> PathBuf {
    PathBuf::from("backgroundmusic")
}

fn default_true() -> bool {
    true
}

fn default_crossfade() -> f64 {
    0.5
}

fn default_search_timeout() -> u64 {
    10
}

fn default_download_timeout() -> u64 {
    60
}

fn default_per_page() -> u32 {
    5
}

fn default_prefetch() -> usize {
    3
}

fn default_music_volume() -> f64 {
    0.25
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        let mut config: Config = serde_json::from_str(text).context("Failed to parse config JSON")?;
        if config.pexels_api_key.trim().is_empty() {
            if let Ok(key) = std::env::var("PEXELS_API_KEY") {
                config.pexels_api_key = key;
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid config: {}", path.as_ref().display()))
    }

    /// Like [`Config::load`], but a missing file yields defaults.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if fs::metadata(&path).await.is_err() {
            logw(format!(
                "{} not found; using default settings",
                path.as_ref().display()
            ));
            return Self::from_json("{}");
        }
        Self::load(path).await
    }

    fn validate(&self) -> Result<()> {
        if !self.crossfade_seconds.is_finite() || self.crossfade_seconds < 0.0 {
            anyhow::bail!("config: crossfade_seconds must be >= 0");
        }
        if self.search_timeout_secs == 0 || self.download_timeout_secs == 0 {
            anyhow::bail!("config: timeouts must be positive");
        }
        if !(0.0..=1.0).contains(&self.music_volume) {
            anyhow::bail!("config: music_volume must be within 0..=1");
        }
        Ok(())
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn output_path(&self, output_id: &str) -> PathBuf {
        self.videos_dir.join(format!("{output_id}.mp4"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.assets_dir, PathBuf::from("assets"));
        assert_eq!(cfg.raw_videos_dir, PathBuf::from("pipeline/raw_videos"));
        assert!(!cfg.use_remote);
        assert!(cfg.use_local && cfg.use_placeholder);
        assert_eq!(cfg.fit_mode, FitMode::FromStart);
        assert_eq!(cfg.crossfade_seconds, 0.5);
        assert_eq!(cfg.search_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.download_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.output_path("abc"), PathBuf::from("pipeline/videos/abc.mp4"));
    }

    #[test]
    fn overrides_and_validation() {
        let cfg = Config::from_json(
            r#"{"use_remote": true, "fit_mode": "centered", "crossfade_seconds": 0, "seed": 9}"#,
        )
        .unwrap();
        assert!(cfg.use_remote);
        assert_eq!(cfg.fit_mode, FitMode::Centered);
        assert_eq!(cfg.seed, Some(9));

        assert!(Config::from_json(r#"{"crossfade_seconds": -1}"#).is_err());
        assert!(Config::from_json(r#"{"search_timeout_secs": 0}"#).is_err());
        assert!(Config::from_json(r#"{"fit_mode": "diagonal"}"#).is_err());
    }

    #[tokio::test]
    async fn missing_file_falls_back_but_broken_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.json");
        assert!(Config::load_or_default(&missing).await.is_ok());

        fs::write(&missing, "{not json").await.unwrap();
        assert!(Config::load_or_default(&missing).await.is_err());
    }
}
