//! Candidate entity names pulled out of free-text input.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// `name.ext` for common source and config extensions
static FILE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b[\w-]+\.(?:tsx|ts|jsx|js|mjs|py|rs|go|java|kt|swift|rb|php|cs|cpp|cc|hpp|c|h|vue|json|toml|yaml|yml|md|sql|sh)\b",
    )
    .expect("valid file name regex")
});

/// `function foo`, `class Bar`, `method baz`, `api qux`
static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:function|class|method|api)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("valid declaration regex")
});

/// Text between matching double, single or back quotes
static QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"\n]+)"|'([^'\n]+)'|`([^`\n]+)`"#).expect("valid quoted regex")
});

/// PascalCase (`UserService`) or camelCase (`getUserById`) identifiers
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[A-Z][a-z0-9]+(?:[A-Z][A-Za-z0-9]*)+|[a-z][a-z0-9]*(?:[A-Z][A-Za-z0-9]*)+)\b")
        .expect("valid identifier regex")
});

/// Extract candidate names in pattern-family order, first occurrence kept.
pub fn extract_candidates(input: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    let mut push = |candidate: &str| {
        let candidate = candidate.trim();
        if !candidate.is_empty() && seen.insert(candidate.to_string()) {
            candidates.push(candidate.to_string());
        }
    };

    for m in FILE_NAME.find_iter(input) {
        push(m.as_str());
    }
    for caps in DECLARATION.captures_iter(input) {
        if let Some(name) = caps.get(1) {
            push(name.as_str());
        }
    }
    for caps in QUOTED.captures_iter(input) {
        if let Some(text) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) {
            push(text.as_str());
        }
    }
    for m in IDENTIFIER.find_iter(input) {
        push(m.as_str());
    }

    candidates
}
