use super::{ClipHandle, ClipQuery, ClipSource, VIDEO_EXTENSIONS, list_files_with_ext};
use crate::engine::MediaEngine;
use crate::error::SourceError;
use crate::{logi, logw};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

enum Library {
    Directory(PathBuf),
    Files(Vec<PathBuf>),
}

/// Serves every clip of a local library. The query is ignored; picking
/// among candidates is the selector's job.
pub struct LocalLibrarySource {
    library: Library,
    engine: Arc<dyn MediaEngine>,
    probed: OnceCell<Vec<ClipHandle>>,
}

impl LocalLibrarySource {
    pub fn from_dir(dir: impl Into<PathBuf>, engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            library: Library::Directory(dir.into()),
            engine,
            probed: OnceCell::new(),
        }
    }

    /// A caller-supplied clip list instead of a directory scan. Clips are
    /// handed out in list order, round-robin.
    pub fn from_files(files: Vec<PathBuf>, engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            library: Library::Files(files),
            engine,
            probed: OnceCell::new(),
        }
    }

    fn label(&self) -> PathBuf {
        match &self.library {
            Library::Directory(dir) => dir.clone(),
            Library::Files(files) => files
                .first()
                .and_then(|f| f.parent())
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }

    fn list_files(&self) -> Vec<PathBuf> {
        match &self.library {
            Library::Directory(dir) => list_files_with_ext(dir, VIDEO_EXTENSIONS),
            Library::Files(files) => files.iter().filter(|p| p.is_file()).cloned().collect(),
        }
    }

    async fn scan(&self) -> Result<Vec<ClipHandle>, SourceError> {
        let files = self.list_files();
        let mut handles = Vec::with_capacity(files.len());
        for path in files {
            match self.engine.probe(&path).await {
                Ok(handle) => handles.push(handle),
                Err(err) => logw(format!("Skipping unreadable clip {}: {}", path.display(), err)),
            }
        }

        if handles.is_empty() {
            return Err(SourceError::NoAssets(self.label()));
        }
        logi(format!(
            "Local library {}: {} usable clip(s)",
            self.label().display(),
            handles.len()
        ));
        Ok(handles)
    }
}

#[async_trait]
impl ClipSource for LocalLibrarySource {
    fn name(&self) -> &'static str {
        "local"
    }

    /// Explicit clip lists are used in the order given.
    fn ordered(&self) -> bool {
        matches!(self.library, Library::Files(_))
    }

    async fn candidates(&self, _query: &ClipQuery) -> Result<Vec<ClipHandle>, SourceError> {
        let handles = self.probed.get_or_try_init(|| self.scan()).await?;
        Ok(handles.clone())
    }
}
