use crate::cancel::CancelFlag;
use crate::compositor::RenderRequest;
use crate::source::ClipHandle;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Output frame geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeParams {
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub threads: u32,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "medium".to_string(),
            threads: 4,
        }
    }
}

/// Decode/probe, synthesize and render. Everything that touches pixels
/// or codecs goes through here.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Probes a visual asset for duration and resolution.
    async fn probe(&self, locator: &Path) -> Result<ClipHandle>;

    async fn audio_duration(&self, path: &Path) -> Result<f64>;

    /// Writes a solid-color clip of `duration` seconds to `out`.
    async fn synthesize_color(
        &self,
        out: &Path,
        canvas: Canvas,
        color: &str,
        duration: f64,
    ) -> Result<ClipHandle>;

    /// Executes a render request and returns the written output path.
    async fn render(&self, request: &RenderRequest, cancel: &CancelFlag) -> Result<PathBuf>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory engine: probes come from a table, synthesis writes an empty
    /// file, renders are recorded.
    #[derive(Default)]
    pub struct FakeEngine {
        pub clips: Mutex<HashMap<PathBuf, (f64, u32, u32)>>,
        pub default_clip: Option<(f64, u32, u32)>,
        pub narration: Option<f64>,
        pub fail_synthesis: bool,
        pub probes: Mutex<Vec<PathBuf>>,
        pub syntheses: Mutex<Vec<PathBuf>>,
        pub renders: Mutex<Vec<RenderRequest>>,
    }

    impl FakeEngine {
        pub fn with_clip(self, path: impl Into<PathBuf>, duration: f64) -> Self {
            self.clips
                .lock()
                .unwrap()
                .insert(path.into(), (duration, 1080, 1920));
            self
        }

        pub fn probe_count(&self) -> usize {
            self.probes.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MediaEngine for FakeEngine {
        async fn probe(&self, locator: &Path) -> Result<ClipHandle> {
            self.probes.lock().unwrap().push(locator.to_path_buf());
            let known = self.clips.lock().unwrap().get(locator).copied();
            let (d, w, h) = known
                .or(self.default_clip)
                .ok_or_else(|| anyhow::anyhow!("unknown clip {}", locator.display()))?;
            Ok(ClipHandle::new(locator, d, w, h)?)
        }

        async fn audio_duration(&self, path: &Path) -> Result<f64> {
            self.narration
                .ok_or_else(|| anyhow::anyhow!("unreadable audio {}", path.display()))
        }

        async fn synthesize_color(
            &self,
            out: &Path,
            canvas: Canvas,
            _color: &str,
            duration: f64,
        ) -> Result<ClipHandle> {
            if self.fail_synthesis {
                anyhow::bail!("synthesis disabled");
            }
            self.syntheses.lock().unwrap().push(out.to_path_buf());
            std::fs::write(out, b"")?;
            Ok(ClipHandle::new(out, duration, canvas.width, canvas.height)?)
        }

        async fn render(&self, request: &RenderRequest, cancel: &CancelFlag) -> Result<PathBuf> {
            if cancel.is_cancelled() {
                anyhow::bail!("cancelled");
            }
            self.renders.lock().unwrap().push(request.clone());
            Ok(request.output.clone())
        }
    }
}
