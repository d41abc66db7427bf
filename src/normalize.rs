//! Similarity kernel shared by the aligner, the flag generator and the queue.
//!
//! Word comparison is deliberately simple: lowercase, keep ASCII word
//! characters and apostrophes, then score by Levenshtein distance.
//!
//! CRITICAL: the aligner's scoring thresholds are calibrated against these
//! exact semantics. Run the alignment tests after any change here.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::LyricToken;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Everything that is not an ASCII word character or an apostrophe.
pub static NON_WORD_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_']").unwrap());

// ============================================================================
// WORD NORMALIZATION
// ============================================================================

/// Normalize a word for comparison.
/// e.g., "Hello," → "hello", "Don't!" → "don't", "¿Qué?" → "qu"
pub fn normalize_word(word: &str) -> String {
    let lower = word.to_lowercase();
    NON_WORD_CHARS.replace_all(&lower, "").into_owned()
}

/// Split a lyrics transcript into tokens on runs of whitespace.
/// Original spelling is preserved; normalization only happens at comparison time.
pub fn tokenize_lyrics(text: &str) -> Vec<LyricToken> {
    text.split_whitespace()
        .enumerate()
        .map(|(index, word)| LyricToken {
            index,
            text: word.to_string(),
        })
        .collect()
}

// ============================================================================
// EDIT DISTANCE & SIMILARITY
// ============================================================================

/// Levenshtein distance with unit costs and no transpositions.
///
/// Fills the whole `(len(b)+1) × (len(a)+1)` table; rows follow `b`,
/// columns follow `a`.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let cols = a_chars.len() + 1;
    let rows = b_chars.len() + 1;

    let mut table = vec![0usize; rows * cols];
    for (i, row) in table.chunks_mut(cols).enumerate() {
        row[0] = i;
    }
    for (j, cell) in table[..cols].iter_mut().enumerate() {
        *cell = j;
    }

    for i in 1..rows {
        for j in 1..cols {
            let at = i * cols + j;
            table[at] = if b_chars[i - 1] == a_chars[j - 1] {
                table[at - cols - 1]
            } else {
                let substitution = table[at - cols - 1];
                let insertion = table[at - 1];
                let deletion = table[at - cols];
                substitution.min(insertion).min(deletion) + 1
            };
        }
    }

    table[rows * cols - 1]
}

/// Similarity ratio in [0, 1] between two raw words.
///
/// Identical after normalization → 1.0, either side empty after
/// normalization → 0.0, otherwise `1 - distance / longer length`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize_word(a);
    let norm_b = normalize_word(b);

    if norm_a == norm_b {
        return 1.0;
    }
    if norm_a.is_empty() || norm_b.is_empty() {
        return 0.0;
    }

    let max_len = norm_a.chars().count().max(norm_b.chars().count());
    let distance = levenshtein_distance(&norm_a, &norm_b);

    1.0 - distance as f64 / max_len as f64
}

// ============================================================================
// SEARCH FOLDING
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold text to lowercase ASCII for queue search.
/// e.g., "Beyoncé" → "beyonce", "Кино" → "kino"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

// ============================================================================
// TESTS
// ============================================================================
