//! Lexical tokenizer for the TF-IDF index.
//!
//! Lower-cases, replaces punctuation with spaces (CJK ideographs survive),
//! splits on whitespace and drops single-character tokens. An optional
//! suffix-stripping stemmer folds simple English inflections.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Anything that is not a word character, whitespace or a CJK ideograph.
static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s\x{4E00}-\x{9FFF}]").expect("valid punctuation regex"));

/// Suffixes removed by the stemmer, tried in order.
const STEM_SUFFIXES: [&str; 5] = ["ing", "ed", "ly", "es", "s"];

/// Minimum stem length (in chars) the stemmer leaves behind.
const MIN_STEM_CHARS: usize = 3;

/// Built-in English and Chinese stop words.
pub static BUILTIN_STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // English
        "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "could", "did",
        "do", "does", "for", "from", "had", "has", "have", "he", "her", "his", "how", "if", "in",
        "into", "is", "it", "its", "may", "me", "my", "no", "not", "of", "on", "or", "our", "she",
        "should", "so", "than", "that", "the", "their", "them", "then", "there", "these", "they",
        "this", "those", "to", "too", "us", "very", "was", "we", "were", "what", "when", "where",
        "which", "while", "who", "why", "will", "with", "would", "you", "your",
        // Chinese
        "的", "了", "和", "是", "在", "我", "有", "也", "就", "不", "人", "都", "一个", "上", "很",
        "到", "说", "要", "去", "你", "会", "着", "没有", "看", "好", "自己", "这", "那", "他",
        "她", "它", "们", "与", "及", "或", "而", "被", "把", "对", "从", "为", "以",
    ]
    .into_iter()
    .collect()
});

/// Check a term against the built-in stop word list.
pub fn is_builtin_stop_word(term: &str) -> bool {
    BUILTIN_STOP_WORDS.contains(term)
}

/// Strip one known suffix if the remaining stem keeps at least three chars.
pub fn stem(token: &str) -> String {
    for suffix in STEM_SUFFIXES {
        if let Some(stem) = token.strip_suffix(suffix) {
            if stem.chars().count() >= MIN_STEM_CHARS {
                return stem.to_string();
            }
        }
    }
    token.to_string()
}

/// Text tokenizer shared by indexing and querying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tokenizer {
    stemming: bool,
}

impl Tokenizer {
    pub fn new(stemming: bool) -> Self {
        Self { stemming }
    }

    /// Whether the stemmer is applied
    pub fn stemming(&self) -> bool {
        self.stemming
    }

    /// Tokenize text into lower-case terms, in order, duplicates kept.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let cleaned = PUNCTUATION.replace_all(&lowered, " ");

        cleaned
            .split_whitespace()
            .filter(|token| token.chars().count() > 1)
            .map(|token| {
                if self.stemming {
                    stem(token)
                } else {
                    token.to_string()
                }
            })
            .collect()
    }
}
