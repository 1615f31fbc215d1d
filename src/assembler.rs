use crate::api::FootageSearch;
use crate::cancel::CancelFlag;
use crate::caption::CaptionEntry;
use crate::compositor::{NarrationTrack, TimelineCompositor, Transition};
use crate::config::Config;
use crate::engine::{Canvas, MediaEngine};
use crate::error::AssemblyError;
use crate::fitter::{DurationFitter, FitMode};
use crate::keywords::{KeywordStrategy, WordFilterKeywords};
use crate::planner;
use crate::selector::{ClipOrigin, ClipSelector, SelectionState, now_seed};
use crate::source::{
    ClipSource, LocalLibrarySource, PlaceholderSource, RemoteSearchSource, list_files_with_ext,
};
use crate::{logi, logok, logw};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MUSIC_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "aac"];

/// Inputs of one assembly run.
#[derive(Debug, Clone)]
pub struct AssemblyJob {
    pub narration: PathBuf,
    pub captions: Vec<CaptionEntry>,
    /// Full narration script; the keyword pool falls back to the caption
    /// texts when absent.
    pub script: Option<String>,
    /// Local clip name hints.
    pub hints: Option<Vec<String>>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyReport {
    pub output: PathBuf,
    pub windows: usize,
    pub dropped_captions: usize,
    pub remote_clips: usize,
    pub local_clips: usize,
    pub reused_clips: usize,
    pub placeholder_clips: usize,
    pub overlays: usize,
    pub overlays_skipped: usize,
    pub duration: f64,
}

impl AssemblyReport {
    fn count(&mut self, origin: &ClipOrigin) {
        match origin {
            ClipOrigin::Remote { .. } => self.remote_clips += 1,
            ClipOrigin::Local => self.local_clips += 1,
            ClipOrigin::Reused => self.reused_clips += 1,
            ClipOrigin::Placeholder => self.placeholder_clips += 1,
        }
    }
}

/// Random track from `dir`, preferring files named like music.
pub fn pick_background_music(dir: &Path, rng: &mut StdRng) -> Option<PathBuf> {
    let songs = list_files_with_ext(dir, MUSIC_EXTENSIONS);
    if songs.is_empty() {
        logw(format!(
            "No background music in {}; output will be narration-only",
            dir.display()
        ));
        return None;
    }

    let named: Vec<&PathBuf> = songs
        .iter()
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_lowercase().contains("music"))
                .unwrap_or(false)
        })
        .collect();
    if named.is_empty() {
        songs.choose(rng).cloned()
    } else {
        named.choose(rng).map(|p| (*p).clone())
    }
}

/// The whole pipeline: plan windows, select and fit a clip per window,
/// compose the timeline and hand it to the media engine.
pub struct Assembler {
    engine: Arc<dyn MediaEngine>,
    remote: Option<Arc<RemoteSearchSource>>,
    local: Option<Arc<dyn ClipSource>>,
    placeholder: Option<Arc<dyn ClipSource>>,
    keywords: Arc<dyn KeywordStrategy>,
    fitter: DurationFitter,
    compositor: TimelineCompositor,
    music_dir: Option<PathBuf>,
    music_volume: f64,
    prefetch_concurrency: usize,
    seed: Option<u64>,
    cancel: CancelFlag,
}

impl Assembler {
    pub fn new(engine: Arc<dyn MediaEngine>, cancel: CancelFlag) -> Self {
        Self {
            engine,
            remote: None,
            local: None,
            placeholder: None,
            keywords: Arc::new(WordFilterKeywords::default()),
            fitter: DurationFitter::default(),
            compositor: TimelineCompositor::default(),
            music_dir: None,
            music_volume: 0.25,
            prefetch_concurrency: 0,
            seed: None,
            cancel,
        }
    }

    /// Wires sources, fitting and rendering options from `cfg`.
    pub fn from_config(
        cfg: &Config,
        engine: Arc<dyn MediaEngine>,
        search: Arc<dyn FootageSearch>,
        cancel: CancelFlag,
    ) -> Self {
        let mut assembler = Self::new(engine.clone(), cancel.clone())
            .with_fit_mode(cfg.fit_mode)
            .with_transition(Transition::from_seconds(cfg.crossfade_seconds))
            .with_music(cfg.music_dir.clone(), cfg.music_volume)
            .with_prefetch(cfg.prefetch_concurrency);
        if let Some(seed) = cfg.seed {
            assembler = assembler.with_seed(seed);
        }

        if cfg.use_remote {
            let remote = RemoteSearchSource::new(search, engine.clone(), &cfg.raw_videos_dir)
                .with_timeouts(cfg.search_timeout(), cfg.download_timeout())
                .with_per_page(cfg.search_per_page)
                .with_cancel(cancel);
            assembler = assembler.with_remote(Arc::new(remote));
        }
        if cfg.use_local {
            assembler = assembler.with_local(Arc::new(LocalLibrarySource::from_dir(
                &cfg.assets_dir,
                engine.clone(),
            )));
        }
        if cfg.use_placeholder {
            assembler = assembler.with_placeholder(Arc::new(PlaceholderSource::new(
                &cfg.raw_videos_dir,
                Canvas::default(),
                engine,
            )));
        }
        assembler
    }

    pub fn with_remote(mut self, remote: Arc<RemoteSearchSource>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_local(mut self, local: Arc<dyn ClipSource>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_placeholder(mut self, placeholder: Arc<dyn ClipSource>) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    pub fn with_keywords(mut self, keywords: Arc<dyn KeywordStrategy>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_fit_mode(mut self, mode: FitMode) -> Self {
        self.fitter = DurationFitter::new(mode);
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.compositor.transition = transition;
        self
    }

    pub fn with_music(mut self, dir: impl Into<PathBuf>, volume: f64) -> Self {
        self.music_dir = Some(dir.into());
        self.music_volume = volume;
        self
    }

    pub fn with_prefetch(mut self, concurrency: usize) -> Self {
        self.prefetch_concurrency = concurrency;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed.unwrap_or_else(now_seed))
    }

    async fn narration_duration(&self, path: &Path) -> Result<f64, AssemblyError> {
        let unreadable = |reason: String| AssemblyError::NarrationUnreadable {
            path: path.to_path_buf(),
            reason,
        };
        let duration = self
            .engine
            .audio_duration(path)
            .await
            .map_err(|e| unreadable(format!("{:#}", e)))?;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(unreadable(format!("invalid duration {duration}")));
        }
        Ok(duration)
    }

    fn selector(&self, pool: Vec<String>) -> ClipSelector {
        let mut selector = ClipSelector::new(pool)
            .with_rng(self.rng())
            .with_cancel(self.cancel.clone());
        if let Some(remote) = &self.remote {
            selector = selector.with_remote(remote.clone() as Arc<dyn ClipSource>);
        }
        if let Some(local) = &self.local {
            selector = selector.with_local(local.clone());
        }
        if let Some(placeholder) = &self.placeholder {
            selector = selector.with_placeholder(placeholder.clone());
        }
        selector
    }

    pub async fn run(&self, job: &AssemblyJob) -> Result<AssemblyReport, AssemblyError> {
        let total = self.narration_duration(&job.narration).await?;
        logi(format!(
            "Narration {}: {:.2}s",
            job.narration.display(),
            total
        ));

        let plan = planner::plan(&job.captions, total)?;
        let mut report = AssemblyReport {
            windows: plan.windows.len(),
            dropped_captions: plan.dropped,
            ..Default::default()
        };

        let pool_source = match &job.script {
            Some(script) if !script.trim().is_empty() => script.clone(),
            _ => plan
                .windows
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        };
        let pool = self.keywords.keyword_pool(&pool_source);
        logi(format!("Keyword pool: {}", pool.join(", ")));

        let primaries: Vec<Option<String>> = plan
            .windows
            .iter()
            .map(|w| self.keywords.caption_keyword(&w.text))
            .collect();

        if let Some(remote) = &self.remote {
            if self.prefetch_concurrency > 0 {
                let keywords: Vec<String> = primaries.iter().flatten().cloned().collect();
                let ready = remote.prefetch(&keywords, self.prefetch_concurrency).await;
                logi(format!("Prefetched footage for {} keyword(s)", ready));
            }
        }

        let mut selector = self.selector(pool);
        let mut state = SelectionState::new();
        let mut segments = Vec::with_capacity(plan.windows.len());
        let count = plan.windows.len();
        for (i, (window, primary)) in plan.windows.iter().zip(&primaries).enumerate() {
            self.cancel.check()?;
            let selection = selector
                .select(window, primary.as_deref(), job.hints.as_deref(), &mut state)
                .await?;
            report.count(&selection.origin);

            let segment = self.fitter.fit(selection.clip, window);
            logi(format!(
                "Window {}/{}: {:.2}s from {} (in {:.2}s, x{})",
                i + 1,
                count,
                segment.out_duration,
                segment.source.locator.display(),
                segment.in_point,
                segment.loops
            ));
            segments.push(segment);
        }
        self.cancel.check()?;

        let narration = NarrationTrack {
            path: job.narration.clone(),
            duration: total,
        };
        let mut request = self
            .compositor
            .compose(segments, &plan.windows, narration, job.output.clone());
        if let Some(dir) = &self.music_dir {
            request.background_music = pick_background_music(dir, &mut self.rng());
        }
        request.music_volume = self.music_volume;

        report.overlays = request.timeline.overlays.len();
        report.overlays_skipped = plan.windows.len() - report.overlays;
        report.duration = request.timeline.duration();

        self.cancel.check()?;
        let output = self
            .engine
            .render(&request, &self.cancel)
            .await
            .map_err(|e| {
                if self.cancel.is_cancelled() {
                    AssemblyError::Cancelled
                } else {
                    AssemblyError::Render(format!("{:#}", e))
                }
            })?;
        logok(format!("Wrote output: {}", output.display()));
        report.output = output;
        Ok(report)
    }
}
