use crate::planner::Window;
use crate::source::ClipHandle;
use serde::{Deserialize, Serialize};

/// Where a long clip's in-point lands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    #[default]
    FromStart,
    Centered,
}

impl std::str::FromStr for FitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "from_start" | "start" => Ok(FitMode::FromStart),
            "centered" | "center" | "middle" => Ok(FitMode::Centered),
            other => Err(format!("unknown fit mode: {other}")),
        }
    }
}

/// A clip played from `in_point` for `out_duration` seconds over the clip
/// repeated `loops` times back to back.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub source: ClipHandle,
    pub in_point: f64,
    pub out_duration: f64,
    pub loops: u32,
}

/// Number of back-to-back repetitions of a clip needed to cover `end`
/// seconds of playback.
pub fn loops_to_cover(clip_duration: f64, end: f64) -> u32 {
    if clip_duration <= 0.0 || end <= clip_duration {
        return 1;
    }
    (end / clip_duration).ceil().max(1.0) as u32
}

impl Segment {
    pub fn span(source: ClipHandle, in_point: f64, out_duration: f64) -> Self {
        let loops = loops_to_cover(source.duration, in_point + out_duration);
        Self {
            source,
            in_point,
            out_duration,
            loops,
        }
    }

    /// Loops needed when the segment is played `extra` seconds past its
    /// out-point (crossfade overlap).
    pub fn loops_with_tail(&self, extra: f64) -> u32 {
        loops_to_cover(self.source.duration, self.in_point + self.out_duration + extra)
    }

    pub fn out_point(&self) -> f64 {
        self.in_point + self.out_duration
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DurationFitter {
    pub mode: FitMode,
}

impl DurationFitter {
    pub fn new(mode: FitMode) -> Self {
        Self { mode }
    }

    /// Fits `clip` to the window: trimmed at an in-point when long enough,
    /// looped from the start otherwise. `out_duration` is always the
    /// window's duration.
    pub fn fit(&self, clip: ClipHandle, window: &Window) -> Segment {
        let needed = window.duration;
        if clip.duration >= needed {
            let in_point = match self.mode {
                FitMode::FromStart => 0.0,
                FitMode::Centered => ((clip.duration - needed) / 2.0).max(0.0),
            };
            return Segment {
                source: clip,
                in_point,
                out_duration: needed,
                loops: 1,
            };
        }

        let loops = loops_to_cover(clip.duration, needed);
        Segment {
            source: clip,
            in_point: 0.0,
            out_duration: needed,
            loops,
        }
    }
}
