use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;

const FALLBACK_KEYWORDS: &[&str] = &["nature", "abstract", "city"];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "with", "from", "that", "this",
    "they", "them", "then", "than", "have", "were", "what", "when", "your", "will", "into",
    "about", "there", "their", "which", "would", "could", "should", "just", "very", "bir", "ve",
    "ile", "için", "bu",
];

fn word_regex() -> Result<&'static Regex> {
    static WORD_RE: OnceCell<Regex> = OnceCell::new();
    WORD_RE.get_or_try_init(|| {
        Regex::new(r"[\p{L}\p{N}']+").context("failed to compile word regex")
    })
}

fn words(text: &str) -> Vec<String> {
    match word_regex() {
        Ok(re) => re.find_iter(text).map(|m| m.as_str().to_string()).collect(),
        Err(_) => text.split_whitespace().map(str::to_string).collect(),
    }
}

/// Turns narration text into footage search keywords.
pub trait KeywordStrategy: Send + Sync {
    /// Keyword pool drawn once from the full script.
    fn keyword_pool(&self, script: &str) -> Vec<String>;

    /// Keyword for a single caption, if the caption has usable words.
    fn caption_keyword(&self, caption_text: &str) -> Option<String>;
}

/// Word-length and stop-word filtering; captions use their first two words.
#[derive(Debug, Clone)]
pub struct WordFilterKeywords {
    pub min_len: usize,
    pub max_keywords: usize,
    pub caption_words: usize,
}

impl Default for WordFilterKeywords {
    fn default() -> Self {
        Self {
            min_len: 4,
            max_keywords: 10,
            caption_words: 2,
        }
    }
}

impl KeywordStrategy for WordFilterKeywords {
    fn keyword_pool(&self, script: &str) -> Vec<String> {
        let lower = script.to_lowercase();
        let mut out: Vec<String> = words(&lower)
            .into_iter()
            .map(|w| w.trim_matches('\'').to_string())
            .filter(|w| w.chars().count() >= self.min_len)
            .filter(|w| !STOP_WORDS.contains(&w.as_str()))
            .take(self.max_keywords)
            .collect();

        if out.is_empty() {
            out = FALLBACK_KEYWORDS.iter().map(|w| w.to_string()).collect();
        }
        out
    }

    fn caption_keyword(&self, caption_text: &str) -> Option<String> {
        let words: Vec<String> = words(&caption_text.to_lowercase())
            .into_iter()
            .map(|w| w.trim_matches('\'').to_string())
            .filter(|w| !w.is_empty())
            .take(self.caption_words)
            .collect();
        if words.is_empty() {
            return None;
        }
        Some(words.join(" "))
    }
}

/// Pool keyword for a window, rotating by window index.
pub fn rotating_keyword(pool: &[String], index: usize) -> Option<&str> {
    if pool.is_empty() {
        return None;
    }
    Some(pool[index % pool.len()].as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_filters_short_and_stop_words() {
        let strategy = WordFilterKeywords::default();
        let pool = strategy.keyword_pool("The ocean is deep, and their whales sing. Ocean!");
        assert_eq!(pool, vec!["ocean", "deep", "whales", "sing", "ocean"]);
    }

    #[test]
    fn pool_is_capped_and_falls_back() {
        let strategy = WordFilterKeywords::default();
        let long = "alpha bravo charlie delta echoes foxtrot golfs hotel india juliet kilos lima";
        assert_eq!(strategy.keyword_pool(long).len(), 10);
        assert_eq!(strategy.keyword_pool("a an the"), vec!["nature", "abstract", "city"]);
        assert_eq!(strategy.keyword_pool(""), vec!["nature", "abstract", "city"]);
    }

    #[test]
    fn caption_keyword_uses_first_two_words() {
        let strategy = WordFilterKeywords::default();
        assert_eq!(
            strategy.caption_keyword("  Mountains rise above the clouds"),
            Some("mountains rise".to_string())
        );
        assert_eq!(strategy.caption_keyword("solo"), Some("solo".to_string()));
        assert_eq!(strategy.caption_keyword("   "), None);
        assert_eq!(strategy.caption_keyword(" ... !"), None);
    }

    #[test]
    fn caption_keyword_ignores_case_and_punctuation() {
        let strategy = WordFilterKeywords::default();
        let a = strategy.caption_keyword("Ocean waves, crashing");
        let b = strategy.caption_keyword("ocean  waves crashing");
        let c = strategy.caption_keyword("\"OCEAN\" waves!");
        assert_eq!(a, Some("ocean waves".to_string()));
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(
            strategy.caption_keyword("'Don't' stop"),
            Some("don't stop".to_string())
        );
    }

    #[test]
    fn rotation_wraps_by_index() {
        let pool: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(rotating_keyword(&pool, 0), Some("a"));
        assert_eq!(rotating_keyword(&pool, 4), Some("b"));
        assert_eq!(rotating_keyword(&[], 4), None);
    }
}
