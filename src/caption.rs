use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tokio::fs;

/// One timed caption line. Timings are seconds from the start of the
/// narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionEntry {
    #[serde(deserialize_with = "seconds_from_json")]
    pub start: f64,
    #[serde(deserialize_with = "seconds_from_json")]
    pub end: f64,
    #[serde(default)]
    pub text: String,
}

impl CaptionEntry {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonSeconds {
    Number(f64),
    Text(String),
}

fn seconds_from_json<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonSeconds::deserialize(deserializer)? {
        JsonSeconds::Number(v) => Ok(v),
        JsonSeconds::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid seconds value: {s:?}"))),
    }
}

pub fn captions_from_json(text: &str) -> Result<Vec<CaptionEntry>> {
    serde_json::from_str(text).context("Failed to parse caption JSON")
}

/// `HH:MM:SS,mmm` (or `.mmm`) to seconds.
fn timestamp_to_seconds(ts: &str) -> Option<f64> {
    let mut parts = ts.trim().split([':', ',', '.']);
    let hh: u32 = parts.next()?.parse().ok()?;
    let mm: u32 = parts.next()?.parse().ok()?;
    let ss: u32 = parts.next()?.parse().ok()?;
    let ms: u32 = match parts.next() {
        Some(v) => v.parse().ok()?,
        None => 0,
    };
    Some(hh as f64 * 3600.0 + mm as f64 * 60.0 + ss as f64 + ms as f64 / 1000.0)
}

fn parse_cue_timing(line: &str) -> Option<(f64, f64)> {
    let (a, b) = line.split_once("-->")?;
    // Cue settings may follow the end timestamp.
    let b = b.split_whitespace().next()?;
    Some((timestamp_to_seconds(a)?, timestamp_to_seconds(b)?))
}

pub fn captions_from_srt(input: &str) -> Vec<CaptionEntry> {
    let cleaned = input.replace("<i>", "").replace("</i>", "");

    let mut out = Vec::new();
    let mut current: Option<(f64, f64, Vec<String>)> = None;
    for line in cleaned.lines() {
        let trimmed = line.trim().trim_start_matches('\u{feff}');
        if let Some((start, end)) = parse_cue_timing(trimmed) {
            if let Some((s, e, text)) = current.take() {
                out.push(CaptionEntry::new(s, e, text.join(" ")));
            }
            current = Some((start, end, Vec::new()));
            continue;
        }

        if trimmed.is_empty() {
            if let Some((s, e, text)) = current.take() {
                out.push(CaptionEntry::new(s, e, text.join(" ")));
            }
            continue;
        }

        if let Some((_, _, text)) = current.as_mut() {
            text.push(trimmed.to_string());
        }
        // Lines outside a cue are sequence numbers.
    }
    if let Some((s, e, text)) = current.take() {
        out.push(CaptionEntry::new(s, e, text.join(" ")));
    }
    out
}

/// Loads a caption file; `.srt` files are parsed as SubRip, everything else
/// as a JSON array of `{start, end, text}`.
pub async fn load_captions(path: &Path) -> Result<Vec<CaptionEntry>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read captions: {}", path.display()))?;

    let is_srt = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("srt"))
        .unwrap_or(false);

    if is_srt {
        Ok(captions_from_srt(&content))
    } else {
        captions_from_json(&content)
            .with_context(|| format!("Invalid caption file: {}", path.display()))
    }
}
