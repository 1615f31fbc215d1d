use crate::config::Config;
use crate::logi;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// Creates the directories the pipeline writes into. Input directories
/// (assets, background music) are left alone: their absence only disables
/// the feature they feed.
pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in [&cfg.raw_videos_dir, &cfg.videos_dir, &cfg.work_dir] {
        if !Path::new(dir).exists() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    for tool in ["ffmpeg", "ffprobe"] {
        let ok = match tokio::process::Command::new(tool)
            .arg("-version")
            .output()
            .await
        {
            Ok(output) => output.status.success(),
            Err(_) => false,
        };
        if !ok {
            return false;
        }
    }
    true
}
