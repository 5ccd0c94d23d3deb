use std::collections::HashSet;

use crate::types::{FileMetadata, FileTypeDetector, DEFAULT_ENCODING};

pub const MAX_KEYWORDS: usize = 20;
pub const MAX_SUMMARY_CHARS: usize = 200;
const MIN_KEYWORD_CHARS: usize = 5;
const SUMMARY_LINES: usize = 3;

/// Derive the descriptive metadata for `content` stored under `file_name`.
///
/// Pure and deterministic. Tags are left empty; they are user-assigned and
/// carried over by the repository, never derived.
pub fn enrich(content: &str, file_name: &str, current_version: Option<u32>) -> FileMetadata {
    FileMetadata {
        encoding: DEFAULT_ENCODING.to_string(),
        mime_type: FileTypeDetector::detect(file_name).mime_type().to_string(),
        word_count: word_count(content),
        line_count: line_count(content),
        keywords: extract_keywords(content),
        summary: summarize(content),
        tags: Vec::new(),
        version: current_version.unwrap_or(1),
    }
}

/// Counts `\n`-separated segments, so a trailing newline adds an empty one.
pub fn line_count(content: &str) -> u64 {
    content.split('\n').count() as u64
}

pub fn word_count(content: &str) -> u64 {
    content.split_whitespace().count() as u64
}

/// Distinct, lower-cased, purely alphabetic tokens of five or more letters in
/// order of first appearance. Tokens carrying digits or punctuation are
/// dropped, not stripped.
pub fn extract_keywords(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    for token in content.split_whitespace() {
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
        let word = token.to_lowercase();
        if word.chars().count() < MIN_KEYWORD_CHARS || !word.chars().all(char::is_alphabetic) {
            continue;
        }
        if seen.insert(word.clone()) {
            keywords.push(word);
        }
    }

    keywords
}

pub fn summarize(content: &str) -> Option<String> {
    let lines: Vec<&str> = content
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(SUMMARY_LINES)
        .collect();

    if lines.is_empty() {
        return None;
    }

    Some(lines.join(" ").chars().take(MAX_SUMMARY_CHARS).collect())
}
