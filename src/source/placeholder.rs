use super::{ClipHandle, ClipQuery, ClipSource};
use crate::engine::{Canvas, MediaEngine};
use crate::error::SourceError;
use crate::logi;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

const PLACEHOLDER_COLOR: &str = "black";

/// Terminal fallback: a solid-color clip of the requested duration.
pub struct PlaceholderSource {
    dir: PathBuf,
    canvas: Canvas,
    engine: Arc<dyn MediaEngine>,
}

impl PlaceholderSource {
    pub fn new(dir: impl Into<PathBuf>, canvas: Canvas, engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            dir: dir.into(),
            canvas,
            engine,
        }
    }

    fn path_for(&self, duration: f64) -> PathBuf {
        let millis = (duration * 1000.0).ceil() as u64;
        self.dir.join(format!("placeholder_{millis}ms.mp4"))
    }
}

#[async_trait]
impl ClipSource for PlaceholderSource {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    async fn candidates(&self, query: &ClipQuery) -> Result<Vec<ClipHandle>, SourceError> {
        let path = self.path_for(query.duration);
        if path.is_file() {
            if let Ok(handle) = self.engine.probe(&path).await {
                if handle.duration + 1e-3 >= query.duration {
                    return Ok(vec![handle]);
                }
            }
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        logi(format!(
            "Synthesizing {:.2}s {} placeholder -> {}",
            query.duration,
            PLACEHOLDER_COLOR,
            path.display()
        ));
        let handle = self
            .engine
            .synthesize_color(&path, self.canvas, PLACEHOLDER_COLOR, query.duration)
            .await
            .map_err(|e| SourceError::Synthesis(e.to_string()))?;
        Ok(vec![handle])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::FakeEngine;

    #[tokio::test]
    async fn returns_exactly_one_clip_of_requested_duration() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let src = PlaceholderSource::new(dir.path().join("raw"), Canvas::default(), engine.clone());

        let clips = src.candidates(&ClipQuery::any(2.5)).await.unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].duration, 2.5);
        assert_eq!((clips[0].width, clips[0].height), (1080, 1920));
        assert!(clips[0].locator.ends_with("placeholder_2500ms.mp4"));
        assert_eq!(engine.syntheses.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reuses_existing_placeholder_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("placeholder_3000ms.mp4");
        std::fs::write(&path, b"").unwrap();
        let engine = Arc::new(FakeEngine::default().with_clip(&path, 3.0));
        let src = PlaceholderSource::new(dir.path(), Canvas::default(), engine.clone());

        let clips = src.candidates(&ClipQuery::any(3.0)).await.unwrap();
        assert_eq!(clips[0].locator, path);
        assert!(engine.syntheses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn synthesis_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine {
            fail_synthesis: true,
            ..Default::default()
        });
        let src = PlaceholderSource::new(dir.path(), Canvas::default(), engine);
        let err = src.candidates(&ClipQuery::any(1.0)).await.unwrap_err();
        assert!(matches!(err, SourceError::Synthesis(_)));
    }
}
