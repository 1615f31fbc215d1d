use crate::cancel::CancelFlag;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

pub mod pexels;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
            Orientation::Square => "square",
        }
    }
}

/// One downloadable rendition returned by a footage search.
#[derive(Debug, Clone, PartialEq)]
pub struct FootageFile {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl FootageFile {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_portrait(&self) -> bool {
        self.width < self.height
    }
}

/// Picks the rendition to download: portrait files first (all files if
/// there are none), then the largest resolution area.
pub fn best_footage_file(files: &[FootageFile]) -> Option<&FootageFile> {
    let portrait: Vec<&FootageFile> = files.iter().filter(|f| f.is_portrait()).collect();
    let pool: Vec<&FootageFile> = if portrait.is_empty() {
        files.iter().collect()
    } else {
        portrait
    };
    pool.into_iter().max_by_key(|f| f.area())
}

#[async_trait]
pub trait FootageSearch: Send + Sync {
    fn has_credentials(&self) -> bool;

    async fn search(
        &self,
        keyword: &str,
        orientation: Orientation,
        limit: u32,
    ) -> Result<Vec<FootageFile>>;

    /// Streams `url` into `dest`, aborting when `cancel` is raised.
    async fn download(&self, url: &str, dest: &Path, cancel: &CancelFlag) -> Result<u64>;
}
