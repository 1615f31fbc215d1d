use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Caption look and placement on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionStyle {
    pub font_size: u32,
    pub color: String,
    pub stroke_color: String,
    pub stroke_width: u32,
    pub box_width: u32,
    pub box_height: u32,
    /// Top edge of the text box; the box is centered horizontally.
    pub top: u32,
    pub font_file: Option<PathBuf>,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_size: 55,
            color: "white".to_string(),
            stroke_color: "black".to_string(),
            stroke_width: 3,
            box_width: 950,
            box_height: 300,
            top: 1400,
            font_file: None,
        }
    }
}

impl CaptionStyle {
    pub fn line_height(&self) -> u32 {
        (self.font_size as f64 * 1.2).round() as u32
    }

    /// Rough advance width of one glyph, used for wrapping.
    fn glyph_width(&self) -> f64 {
        self.font_size as f64 * 0.55
    }

    fn max_chars_per_line(&self) -> usize {
        ((self.box_width as f64 / self.glyph_width()).floor() as usize).max(1)
    }

    fn max_lines(&self) -> usize {
        (self.box_height / self.line_height().max(1)) as usize
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("caption text is empty")]
    Empty,
    #[error("unsupported character {0:?} in caption")]
    UnsupportedCharacter(char),
    #[error("caption needs {needed} lines but the box fits {available}")]
    Overflow { needed: usize, available: usize },
}

/// Laid-out caption ready to be drawn by the media engine.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayVisual {
    pub lines: Vec<String>,
    pub style: CaptionStyle,
}

pub trait TextRenderer: Send + Sync {
    fn render(&self, text: &str, style: &CaptionStyle) -> Result<OverlayVisual, LayoutError>;
}

/// Greedy word wrap into the caption box.
#[derive(Debug, Clone, Copy, Default)]
pub struct WrappingTextRenderer;

fn wrap_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word.to_string();
        // Hard-split words wider than the box.
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(max_chars).collect();
            word = word.chars().skip(max_chars).collect();
            lines.push(head);
        }
        if word.is_empty() {
            continue;
        }

        let extra = if current.is_empty() { 0 } else { 1 };
        if current.chars().count() + extra + word.chars().count() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

impl TextRenderer for WrappingTextRenderer {
    fn render(&self, text: &str, style: &CaptionStyle) -> Result<OverlayVisual, LayoutError> {
        if let Some(bad) = text.chars().find(|c| c.is_control() && !c.is_whitespace()) {
            return Err(LayoutError::UnsupportedCharacter(bad));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(LayoutError::Empty);
        }

        let lines = wrap_words(text, style.max_chars_per_line());
        let available = style.max_lines();
        if lines.len() > available {
            return Err(LayoutError::Overflow {
                needed: lines.len(),
                available,
            });
        }

        Ok(OverlayVisual {
            lines,
            style: style.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_to_box_width() {
        let style = CaptionStyle::default();
        let max = style.max_chars_per_line();
        let visual = WrappingTextRenderer
            .render("Bu bir deneme cümlesidir ve oldukça uzun bir altyazı satırıdır", &style)
            .unwrap();
        assert!(visual.lines.len() > 1);
        assert!(visual.lines.iter().all(|l| l.chars().count() <= max));
        assert_eq!(
            visual.lines.join(" "),
            "Bu bir deneme cümlesidir ve oldukça uzun bir altyazı satırıdır"
        );
    }

    #[test]
    fn splits_words_wider_than_the_box() {
        let lines = wrap_words("abcdefghij xy", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij", "xy"]);
    }

    #[test]
    fn rejects_empty_control_and_overflowing_text() {
        let style = CaptionStyle::default();
        assert_eq!(WrappingTextRenderer.render("  ", &style), Err(LayoutError::Empty));
        assert_eq!(
            WrappingTextRenderer.render("bell\u{7}", &style),
            Err(LayoutError::UnsupportedCharacter('\u{7}'))
        );
        let huge = "word ".repeat(400);
        assert!(matches!(
            WrappingTextRenderer.render(&huge, &style),
            Err(LayoutError::Overflow { .. })
        ));
    }

    #[test]
    fn default_style_matches_vertical_layout() {
        let style = CaptionStyle::default();
        assert_eq!(style.line_height(), 66);
        assert_eq!(style.max_lines(), 4);
        assert_eq!(style.max_chars_per_line(), 31);
    }
}
