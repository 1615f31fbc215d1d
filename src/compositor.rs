use crate::engine::{Canvas, EncodeParams};
use crate::fitter::Segment;
use crate::overlay::{CaptionStyle, OverlayVisual, TextRenderer, WrappingTextRenderer};
use crate::planner::Window;
use crate::{logi, logw};
use std::path::PathBuf;
use std::sync::Arc;

/// Clamp tolerance; shortfalls below this are treated as exact.
const DURATION_EPSILON: f64 = 1e-6;

/// How consecutive segments are joined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Cut,
    Crossfade { seconds: f64 },
}

impl Transition {
    pub fn from_seconds(seconds: f64) -> Self {
        if seconds > 0.0 {
            Transition::Crossfade { seconds }
        } else {
            Transition::Cut
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NarrationTrack {
    pub path: PathBuf,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayDescriptor {
    pub window_index: usize,
    pub text: String,
    pub start: f64,
    pub duration: f64,
    pub visual: OverlayVisual,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Timeline {
    pub segments: Vec<Segment>,
    pub overlays: Vec<OverlayDescriptor>,
}

impl Timeline {
    pub fn duration(&self) -> f64 {
        self.segments.iter().map(|s| s.out_duration).sum()
    }
}

/// Everything the media engine needs to produce the final file.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub timeline: Timeline,
    pub transition: Transition,
    pub narration: NarrationTrack,
    pub background_music: Option<PathBuf>,
    pub music_volume: f64,
    pub canvas: Canvas,
    pub encode: EncodeParams,
    pub output: PathBuf,
}

pub struct TimelineCompositor {
    pub canvas: Canvas,
    pub transition: Transition,
    pub style: CaptionStyle,
    pub encode: EncodeParams,
    renderer: Arc<dyn TextRenderer>,
}

impl Default for TimelineCompositor {
    fn default() -> Self {
        Self {
            canvas: Canvas::default(),
            transition: Transition::Crossfade { seconds: 0.5 },
            style: CaptionStyle::default(),
            encode: EncodeParams::default(),
            renderer: Arc::new(WrappingTextRenderer),
        }
    }
}

/// Forces the summed segment durations to `target`: excess is trimmed from
/// the end, a shortfall is filled by replaying the final segment's trailing
/// range.
pub fn clamp_to_duration(mut segments: Vec<Segment>, target: f64) -> Vec<Segment> {
    let mut elapsed = 0.0;
    let mut keep = 0;
    for seg in segments.iter_mut() {
        let remaining = target - elapsed;
        if remaining <= DURATION_EPSILON {
            break;
        }
        if seg.out_duration > remaining {
            *seg = Segment::span(seg.source.clone(), seg.in_point, remaining);
        }
        elapsed += seg.out_duration;
        keep += 1;
    }
    segments.truncate(keep);

    let deficit = target - segments.iter().map(|s| s.out_duration).sum::<f64>();
    if deficit > DURATION_EPSILON {
        if let Some(last) = segments.last() {
            let in_point = (last.out_point() - deficit).max(0.0);
            let tail = Segment::span(last.source.clone(), in_point, deficit);
            segments.push(tail);
        }
    }
    segments
}

impl TimelineCompositor {
    pub fn with_renderer(mut self, renderer: Arc<dyn TextRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// One overlay per window, clipped to the narration. Layout failures
    /// skip only the offending caption.
    pub fn build_overlays(&self, windows: &[Window], narration_end: f64) -> Vec<OverlayDescriptor> {
        let mut out = Vec::with_capacity(windows.len());
        for window in windows {
            if window.start >= narration_end {
                logw(format!(
                    "Caption {} starts after narration end; overlay skipped",
                    window.index + 1
                ));
                continue;
            }
            let visual = match self.renderer.render(&window.text, &self.style) {
                Ok(v) => v,
                Err(err) => {
                    logw(format!("Failed to lay out caption {}: {}", window.index + 1, err));
                    continue;
                }
            };
            out.push(OverlayDescriptor {
                window_index: window.index,
                text: window.text.clone(),
                start: window.start,
                duration: window.end.min(narration_end) - window.start,
                visual,
            });
        }
        out
    }

    pub fn compose(
        &self,
        segments: Vec<Segment>,
        windows: &[Window],
        narration: NarrationTrack,
        output: PathBuf,
    ) -> RenderRequest {
        let assembled: f64 = segments.iter().map(|s| s.out_duration).sum();
        let segments = clamp_to_duration(segments, narration.duration);
        if (assembled - narration.duration).abs() > DURATION_EPSILON {
            logi(format!(
                "Background clamped from {:.3}s to narration {:.3}s",
                assembled, narration.duration
            ));
        }

        let overlays = self.build_overlays(windows, narration.duration);
        logi(format!(
            "{} overlay(s) built from {} caption(s)",
            overlays.len(),
            windows.len()
        ));

        RenderRequest {
            timeline: Timeline { segments, overlays },
            transition: self.transition,
            narration,
            background_music: None,
            music_volume: 0.25,
            canvas: self.canvas,
            encode: self.encode.clone(),
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::LayoutError;
    use crate::source::ClipHandle;

    fn seg(duration: f64, clip_len: f64) -> Segment {
        let clip = ClipHandle::new("c.mp4", clip_len, 1080, 1920).unwrap();
        Segment::span(clip, 0.0, duration)
    }

    fn window(index: usize, start: f64, end: f64, text: &str) -> Window {
        Window {
            index,
            start,
            end,
            duration: end - start,
            text: text.to_string(),
        }
    }

    fn total(segments: &[Segment]) -> f64 {
        segments.iter().map(|s| s.out_duration).sum()
    }

    #[test]
    fn shortfall_replays_final_segment_tail() {
        let out = clamp_to_duration(vec![seg(2.0, 1.2), seg(3.0, 1.2)], 10.0);
        let durations: Vec<f64> = out.iter().map(|s| s.out_duration).collect();
        assert_eq!(durations, vec![2.0, 3.0, 5.0]);
        assert_eq!(out[2].in_point, 0.0);
        assert_eq!(out[2].loops, 5);
    }

    #[test]
    fn small_shortfall_replays_only_the_trailing_range() {
        let out = clamp_to_duration(vec![seg(2.0, 10.0), seg(3.0, 10.0)], 5.2);
        assert_eq!(out.len(), 3);
        assert!((out[2].in_point - 2.8).abs() < 1e-9);
        assert!((out[2].out_duration - 0.2).abs() < 1e-9);
    }

    #[test]
    fn excess_is_trimmed_from_the_end() {
        let out = clamp_to_duration(vec![seg(4.0, 5.0), seg(4.0, 5.0), seg(4.0, 5.0)], 6.5);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].out_duration, 2.5);
        assert!((total(&out) - 6.5).abs() < 1e-9);
    }

    #[test]
    fn rounding_error_per_window_always_clamps_exactly() {
        // Windows jittered by up to +/-50ms against a 1s grid.
        let jitter = [0.05, -0.05, 0.031, -0.049, 0.0, 0.02, -0.013, 0.05];
        for n in 1..=jitter.len() {
            let segments: Vec<Segment> = jitter[..n].iter().map(|j| seg(1.0 + j, 0.8)).collect();
            let target = n as f64;
            let out = clamp_to_duration(segments, target);
            assert!(
                (total(&out) - target).abs() < 1e-9,
                "n={n} total={}",
                total(&out)
            );
        }
    }

    #[test]
    fn exact_fit_is_left_untouched() {
        let input = vec![seg(2.0, 3.0), seg(3.0, 3.0)];
        assert_eq!(clamp_to_duration(input.clone(), 5.0), input);
    }

    struct Picky;

    impl TextRenderer for Picky {
        fn render(&self, text: &str, style: &CaptionStyle) -> Result<OverlayVisual, LayoutError> {
            if text.contains('#') {
                return Err(LayoutError::UnsupportedCharacter('#'));
            }
            Ok(OverlayVisual {
                lines: vec![text.to_string()],
                style: style.clone(),
            })
        }
    }

    #[test]
    fn overlay_failures_skip_only_that_caption() {
        let compositor = TimelineCompositor::default().with_renderer(Arc::new(Picky));
        let windows = vec![
            window(0, 0.0, 2.0, "one"),
            window(1, 2.0, 4.0, "#two"),
            window(2, 4.0, 12.0, "three"),
            window(3, 11.0, 13.0, "late"),
        ];
        let overlays = compositor.build_overlays(&windows, 10.0);
        let texts: Vec<&str> = overlays.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "three"]);
        assert_eq!(overlays[1].start, 4.0);
        assert_eq!(overlays[1].duration, 6.0);
    }

    #[test]
    fn compose_produces_a_request_matching_narration() {
        let compositor = TimelineCompositor::default();
        let windows = vec![window(0, 0.0, 2.0, "a"), window(1, 2.0, 5.0, "b")];
        let narration = NarrationTrack {
            path: PathBuf::from("voice.mp3"),
            duration: 10.0,
        };
        let req = compositor.compose(
            vec![seg(2.0, 1.2), seg(3.0, 1.2)],
            &windows,
            narration.clone(),
            PathBuf::from("out.mp4"),
        );
        assert!((req.timeline.duration() - 10.0).abs() < 1e-9);
        assert_eq!(req.timeline.overlays.len(), 2);
        assert_eq!(req.narration, narration);
        assert_eq!(req.transition, Transition::Crossfade { seconds: 0.5 });
        assert_eq!(Transition::from_seconds(0.0), Transition::Cut);
    }
}
