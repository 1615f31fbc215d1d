use crate::caption::CaptionEntry;
use crate::error::AssemblyError;
use crate::{logi, logw};

/// A time interval one visual segment must fill exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Position of the originating caption in the input list.
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub text: String,
}

/// Result of planning: the windows plus how many captions were dropped.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub windows: Vec<Window>,
    pub dropped: usize,
}

/// Maps captions 1:1 onto windows, preserving order. Entries with
/// `end <= start` (or non-finite timings) are dropped with a warning.
/// Windows are not forced to tile `total_duration`; the compositor clamps.
pub fn plan(captions: &[CaptionEntry], total_duration: f64) -> Result<Plan, AssemblyError> {
    if captions.is_empty() {
        return Err(AssemblyError::EmptyInput);
    }

    let mut out = Plan::default();
    for (index, caption) in captions.iter().enumerate() {
        let valid = caption.start.is_finite()
            && caption.end.is_finite()
            && caption.start >= 0.0
            && caption.end > caption.start;
        if !valid {
            logw(format!(
                "Dropping caption {} ({:.3} -> {:.3}): invalid timing",
                index + 1,
                caption.start,
                caption.end
            ));
            out.dropped += 1;
            continue;
        }

        if caption.start >= total_duration {
            logi(format!(
                "Caption {} starts at {:.2}s, past narration end {:.2}s",
                index + 1,
                caption.start,
                total_duration
            ));
        }

        out.windows.push(Window {
            index,
            start: caption.start,
            end: caption.end,
            duration: caption.end - caption.start,
            text: caption.text.clone(),
        });
    }

    if out.windows.is_empty() {
        return Err(AssemblyError::EmptyInput);
    }

    Ok(out)
}
