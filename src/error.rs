use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fatal errors that abort an assembly run.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("caption list is empty (no usable caption entries)")]
    EmptyInput,

    #[error("narration audio unreadable: {path}: {reason}")]
    NarrationUnreadable { path: PathBuf, reason: String },

    #[error(
        "no footage available for window {window}: every source failed and no placeholder could be synthesized"
    )]
    NoFootageAvailable { window: usize },

    #[error("assembly cancelled")]
    Cancelled,

    #[error("render failed: {0}")]
    Render(String),
}

impl AssemblyError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AssemblyError::EmptyInput => 2,
            AssemblyError::NarrationUnreadable { .. } => 3,
            AssemblyError::NoFootageAvailable { .. } => 4,
            AssemblyError::Render(_) => 5,
            AssemblyError::Cancelled => 130,
        }
    }
}

/// A single clip source failing. The selector absorbs every variant and
/// moves on to the next tier of the fallback chain.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no assets found in {0}")]
    NoAssets(PathBuf),

    #[error("footage search credentials missing")]
    MissingCredentials,

    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    #[error("search failed: {0}")]
    Search(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("probe failed for {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("placeholder synthesis failed: {0}")]
    Synthesis(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            AssemblyError::EmptyInput.exit_code(),
            AssemblyError::NarrationUnreadable {
                path: PathBuf::from("a.mp3"),
                reason: "missing".to_string(),
            }
            .exit_code(),
            AssemblyError::NoFootageAvailable { window: 0 }.exit_code(),
            AssemblyError::Render("boom".to_string()).exit_code(),
            AssemblyError::Cancelled.exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in codes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
