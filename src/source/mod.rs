use crate::error::SourceError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub mod local;
pub mod placeholder;
pub mod remote;

pub use local::LocalLibrarySource;
pub use placeholder::PlaceholderSource;
pub use remote::RemoteSearchSource;

/// A decodable visual asset with its probed duration and resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipHandle {
    pub locator: PathBuf,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
}

impl ClipHandle {
    pub fn new(
        locator: impl Into<PathBuf>,
        duration: f64,
        width: u32,
        height: u32,
    ) -> Result<Self, SourceError> {
        let locator = locator.into();
        if !duration.is_finite() || duration <= 0.0 {
            return Err(SourceError::Probe {
                path: locator,
                reason: format!("non-positive duration {duration}"),
            });
        }
        Ok(Self {
            locator,
            duration,
            width,
            height,
        })
    }

    /// Lower-cased file name, used for hint matching.
    pub fn name_lower(&self) -> String {
        self.locator
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// What a source is asked for. Sources use the parts relevant to them:
/// remote search reads the keyword, the placeholder reads the duration,
/// the local library ignores both.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipQuery {
    pub keyword: Option<String>,
    pub duration: f64,
}

impl ClipQuery {
    pub fn keyword(keyword: impl Into<String>, duration: f64) -> Self {
        Self {
            keyword: Some(keyword.into()),
            duration,
        }
    }

    pub fn any(duration: f64) -> Self {
        Self {
            keyword: None,
            duration,
        }
    }
}

#[async_trait]
pub trait ClipSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether candidates come in a meaningful order that selection should
    /// walk through instead of sampling.
    fn ordered(&self) -> bool {
        false
    }

    /// Candidate clips for `query`, possibly empty.
    async fn candidates(&self, query: &ClipQuery) -> Result<Vec<ClipHandle>, SourceError>;
}

pub(crate) const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm"];

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Files directly inside `dir` with one of `extensions`, sorted. A missing
/// directory lists as empty.
pub(crate) fn list_files_with_ext(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut out: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| has_extension(p, extensions))
        .collect();
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_rejects_non_positive_duration() {
        assert!(ClipHandle::new("a.mp4", 0.0, 10, 10).is_err());
        assert!(ClipHandle::new("a.mp4", f64::NAN, 10, 10).is_err());
        assert!(ClipHandle::new("a.mp4", 0.5, 10, 10).is_ok());
    }

    #[test]
    fn name_lower_uses_file_name_only() {
        let h = ClipHandle::new("/Stock/Ocean_Waves.MP4", 3.0, 1080, 1920).unwrap();
        assert_eq!(h.name_lower(), "ocean_waves.mp4");
        assert_eq!(h.area(), 1080 * 1920);
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(has_extension(Path::new("x/clip.MOV"), VIDEO_EXTENSIONS));
        assert!(!has_extension(Path::new("x/clip.txt"), VIDEO_EXTENSIONS));
        assert!(!has_extension(Path::new("x/clip"), VIDEO_EXTENSIONS));
    }

    #[test]
    fn listing_is_flat_sorted_and_tolerates_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mp3", "a.WAV", "skip.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.mp3"), b"").unwrap();

        let found = list_files_with_ext(dir.path(), &["mp3", "wav"]);
        assert_eq!(found, vec![dir.path().join("a.WAV"), dir.path().join("b.mp3")]);
        assert!(list_files_with_ext(&dir.path().join("missing"), &["mp3"]).is_empty());
    }
}
