//! Tokenizer for text properties and uris
//!
//! Pipeline: UAX#29 word boundaries -> strip possessives -> split on the
//! remaining punctuation -> lowercase -> drop single characters.
//!
//! There is no stemming or stopword removal: a term query matches the exact
//! word, so `Query::term("title", "on")` still finds "Notes on budgets".
//! Punctuation inside a UAX#29 word (`q1.html`, `rev_2`) splits it, so every
//! path segment and file extension of a uri is searchable on its own.

use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

const MIN_TOKEN_CHARS: usize = 2;

/// Strip an English possessive suffix (`'s` / `\u{2019}s`)
fn strip_possessive(word: &str) -> &str {
    word.strip_suffix("'s")
        .or_else(|| word.strip_suffix("\u{2019}s"))
        .unwrap_or(word)
}

/// Iterator over the terms of `text`, in order, duplicates included
fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.unicode_words()
        .map(strip_possessive)
        .flat_map(|word| word.split(|c: char| !c.is_alphanumeric()))
        .filter(|part| part.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_lowercase)
}

/// Tokenize text into searchable terms
///
/// # Example
///
/// ```
/// use quarry_index::tokenizer::tokenize;
///
/// let tokens = tokenize("Alice's Quarterly-Report, 2024!");
/// assert_eq!(tokens, vec!["alice", "quarterly", "report", "2024"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    terms(text).collect()
}

/// Tokenize and deduplicate, keeping first occurrences in order
///
/// # Example
///
/// ```
/// use quarry_index::tokenizer::tokenize_unique;
///
/// let tokens = tokenize_unique("draft DRAFT final draft");
/// assert_eq!(tokens, vec!["draft", "final"]);
/// ```
pub fn tokenize_unique(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    terms(text).filter(|t| seen.insert(t.clone())).collect()
}
