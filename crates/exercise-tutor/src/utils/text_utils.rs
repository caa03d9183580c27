//! Text helpers shared by corpus chunking and retrieval

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

lazy_static! {
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").expect("static regex");
    static ref TOKEN_REGEX: Regex = Regex::new(r"[\p{L}\p{N}_]+").expect("static regex");
}

/// Common English words that carry no retrieval signal.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "it", "in", "on", "of", "to", "and", "or", "for", "with", "this",
    "that", "be", "are", "was", "were", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "can", "not", "no", "but", "if",
    "at", "by", "from", "as", "into", "about", "so", "its", "you", "your", "my", "we", "our",
    "they", "them", "their",
];

pub struct TextUtils;

impl TextUtils {
    /// Collapse runs of whitespace into single spaces and trim the ends
    pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
        let needs_work = text.starts_with(char::is_whitespace)
            || text.ends_with(char::is_whitespace)
            || text.contains(|c: char| c.is_whitespace() && c != ' ')
            || text.contains("  ");
        if needs_work {
            Cow::Owned(WHITESPACE_REGEX.replace_all(text, " ").trim().to_string())
        } else {
            Cow::Borrowed(text)
        }
    }

    /// Lowercased word tokens with stop words and single characters removed
    pub fn index_terms(text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        TOKEN_REGEX
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|w| w.chars().count() > 1 && !STOP_WORDS.contains(w))
            .map(str::to_string)
            .collect()
    }
}
