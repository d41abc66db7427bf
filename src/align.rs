//! Global alignment of lyric tokens against word timings.
//!
//! Needleman-Wunsch over an `(n+1) × (m+1)` score matrix with a linear gap
//! penalty and the similarity kernel as substitution score:
//! - Rows follow lyric tokens, columns follow timing entries
//! - Row 0 and column 0 accumulate the gap penalty (true global alignment)
//! - Ties prefer diagonal, then up, then left
//!
//! The result is exact and deterministic; no banding is applied.

use crate::models::{AlignmentEdge, LyricToken, WordTiming};
use crate::normalize::{similarity, tokenize_lyrics};

// ============================================================================
// Score Thresholds
// ============================================================================

/// Minimum similarity for a diagonal step to be reported as `match`.
pub const MATCH_THRESHOLD: f64 = 0.8;

/// Similarity above which a substitution is scored on the similarity curve.
/// At or below it every substitution costs `MISMATCH_SCORE`.
pub const SCORE_THRESHOLD: f64 = 0.6;

/// Weight applied to similarity for scored substitutions (perfect match = 2.0)
pub const MATCH_WEIGHT: f64 = 2.0;

/// Flat substitution penalty below `SCORE_THRESHOLD`
pub const MISMATCH_SCORE: f64 = -1.0;

/// Linear gap penalty, both directions
pub const GAP_SCORE: f64 = -2.0;

/// Alignment scoring parameters. `Default` uses the constants above.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignConfig {
    pub match_threshold: f64,
    pub score_threshold: f64,
    pub match_weight: f64,
    pub mismatch_score: f64,
    pub gap_score: f64,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            match_threshold: MATCH_THRESHOLD,
            score_threshold: SCORE_THRESHOLD,
            match_weight: MATCH_WEIGHT,
            mismatch_score: MISMATCH_SCORE,
            gap_score: GAP_SCORE,
        }
    }
}

impl AlignConfig {
    /// Substitution score for a pair with the given similarity.
    pub fn substitution_score(&self, sim: f64) -> f64 {
        if sim > self.score_threshold {
            self.match_weight * sim
        } else {
            self.mismatch_score
        }
    }
}

// ============================================================================
// Matrix
// ============================================================================

/// Traceback pointer for one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Diagonal,
    Up,
    Left,
}

/// Row-major `(rows × cols)` score matrix with a traceback pointer per cell.
struct ScoreMatrix {
    cols: usize,
    scores: Vec<f64>,
    steps: Vec<Step>,
}

impl ScoreMatrix {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            cols,
            scores: vec![0.0; rows * cols],
            steps: vec![Step::Diagonal; rows * cols],
        }
    }

    #[inline]
    fn score(&self, i: usize, j: usize) -> f64 {
        self.scores[i * self.cols + j]
    }

    #[inline]
    fn step(&self, i: usize, j: usize) -> Step {
        self.steps[i * self.cols + j]
    }

    #[inline]
    fn set(&mut self, i: usize, j: usize, score: f64, step: Step) {
        let at = i * self.cols + j;
        self.scores[at] = score;
        self.steps[at] = step;
    }
}

// ============================================================================
// Alignment
// ============================================================================

/// Align a raw lyrics transcript against word timings with default scoring.
///
/// Returns an empty alignment when the lyrics have no tokens or there are no
/// timings; "nothing to check" is not an error.
pub fn align_lyrics_to_timings(lyrics_text: &str, word_timings: &[WordTiming]) -> Vec<AlignmentEdge> {
    align_with(&AlignConfig::default(), lyrics_text, word_timings)
}

/// Align with explicit scoring parameters.
pub fn align_with(
    config: &AlignConfig,
    lyrics_text: &str,
    word_timings: &[WordTiming],
) -> Vec<AlignmentEdge> {
    let tokens = tokenize_lyrics(lyrics_text);
    align_tokens(config, &tokens, word_timings)
}

/// Align pre-tokenized lyrics against word timings.
pub fn align_tokens(
    config: &AlignConfig,
    tokens: &[LyricToken],
    word_timings: &[WordTiming],
) -> Vec<AlignmentEdge> {
    let n = tokens.len();
    let m = word_timings.len();
    if n == 0 || m == 0 {
        return Vec::new();
    }

    let matrix = fill_matrix(config, tokens, word_timings);
    traceback(config, &matrix, tokens, word_timings)
}

fn fill_matrix(config: &AlignConfig, tokens: &[LyricToken], word_timings: &[WordTiming]) -> ScoreMatrix {
    let n = tokens.len();
    let m = word_timings.len();
    let mut matrix = ScoreMatrix::new(n + 1, m + 1);

    for i in 1..=n {
        let score = matrix.score(i - 1, 0) + config.gap_score;
        matrix.set(i, 0, score, Step::Up);
    }
    for j in 1..=m {
        let score = matrix.score(0, j - 1) + config.gap_score;
        matrix.set(0, j, score, Step::Left);
    }

    for i in 1..=n {
        let lyric = tokens[i - 1].text.as_str();
        for j in 1..=m {
            let sim = similarity(lyric, &word_timings[j - 1].word);

            let diagonal = matrix.score(i - 1, j - 1) + config.substitution_score(sim);
            let up = matrix.score(i - 1, j) + config.gap_score;
            let left = matrix.score(i, j - 1) + config.gap_score;

            if diagonal >= up && diagonal >= left {
                matrix.set(i, j, diagonal, Step::Diagonal);
            } else if up >= left {
                matrix.set(i, j, up, Step::Up);
            } else {
                matrix.set(i, j, left, Step::Left);
            }
        }
    }

    matrix
}

fn traceback(
    config: &AlignConfig,
    matrix: &ScoreMatrix,
    tokens: &[LyricToken],
    word_timings: &[WordTiming],
) -> Vec<AlignmentEdge> {
    let mut i = tokens.len();
    let mut j = word_timings.len();
    let mut edges = Vec::with_capacity(i + j);

    while i > 0 || j > 0 {
        // Matrix edges have exactly one legal direction.
        let step = if i == 0 {
            Step::Left
        } else if j == 0 {
            Step::Up
        } else {
            matrix.step(i, j)
        };

        match step {
            Step::Diagonal => {
                let token = &tokens[i - 1];
                let sim = similarity(&token.text, &word_timings[j - 1].word);
                let edge = if sim >= config.match_threshold {
                    AlignmentEdge::Match {
                        lyric_index: token.index,
                        lyric_word: token.text.clone(),
                        timing_index: j - 1,
                        similarity: sim,
                    }
                } else {
                    AlignmentEdge::Mismatch {
                        lyric_index: token.index,
                        lyric_word: token.text.clone(),
                        timing_index: j - 1,
                        similarity: sim,
                    }
                };
                edges.push(edge);
                i -= 1;
                j -= 1;
            }
            Step::Up => {
                let token = &tokens[i - 1];
                edges.push(AlignmentEdge::MissingTiming {
                    lyric_index: token.index,
                    lyric_word: token.text.clone(),
                });
                i -= 1;
            }
            Step::Left => {
                edges.push(AlignmentEdge::ExtraTiming { timing_index: j - 1 });
                j -= 1;
            }
        }
    }

    edges.reverse();
    edges
}

// ============================================================================
// TESTS
// ============================================================================
