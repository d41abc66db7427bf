//! Quality-control flags for word timings.
//!
//! Two independent sources feed the per-word flag lists:
//! - Raw timing checks (duration and overlap with the next entry by index)
//! - Alignment against the lyrics (text mismatches, extra and missing words)
//!
//! Flags are keyed by positional index. Any structural edit to the timing
//! list invalidates them; callers must run a fresh full pass.

use crate::align::{align_with, AlignConfig};
use crate::models::{AlignmentEdge, Flag, FlagCounts, FlagKind, FlagReport, WordTiming};
use crate::song::SongData;

// ============================================================================
// Timing Thresholds
// ============================================================================

/// Words longer than this (seconds) are flagged `timing_long`
pub const LONG_WORD_SECONDS: f64 = 3.0;

/// Words shorter than this (seconds) are flagged `timing_short`
pub const SHORT_WORD_SECONDS: f64 = 0.03;

/// Overlap with the next word is tolerated up to this many seconds
pub const OVERLAP_TOLERANCE_SECONDS: f64 = 0.01;

/// Flagging parameters. `Default` uses the constants above and the default
/// alignment scoring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlagConfig {
    pub long_seconds: f64,
    pub short_seconds: f64,
    pub overlap_tolerance: f64,
    pub align: AlignConfig,
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            long_seconds: LONG_WORD_SECONDS,
            short_seconds: SHORT_WORD_SECONDS,
            overlap_tolerance: OVERLAP_TOLERANCE_SECONDS,
            align: AlignConfig::default(),
        }
    }
}

// ============================================================================
// Flag Generation
// ============================================================================

/// Generate the full flag report for a song with default thresholds.
pub fn generate_flags(song: &SongData) -> FlagReport {
    generate_flags_with(&FlagConfig::default(), song.lyrics_text.as_deref(), &song.word_timings)
}

/// Generate the full flag report from raw inputs.
///
/// Timing checks always run. Alignment checks are skipped when there is no
/// lyrics text or no timings.
pub fn generate_flags_with(
    config: &FlagConfig,
    lyrics_text: Option<&str>,
    word_timings: &[WordTiming],
) -> FlagReport {
    let mut word_flags: Vec<Vec<Flag>> = word_timings
        .iter()
        .enumerate()
        .map(|(index, timing)| timing_flags(config, word_timings, index, timing))
        .collect();

    let alignment = match lyrics_text {
        Some(lyrics) if !lyrics.is_empty() && !word_timings.is_empty() => {
            align_with(&config.align, lyrics, word_timings)
        }
        _ => Vec::new(),
    };

    let mut missing_word = 0;
    for edge in &alignment {
        match edge {
            AlignmentEdge::Mismatch {
                lyric_word,
                timing_index,
                similarity,
                ..
            } => {
                let Some(flags) = word_flags.get_mut(*timing_index) else {
                    continue;
                };
                flags.push(Flag {
                    kind: FlagKind::TextMismatch,
                    message: format!(
                        "Expected \"{}\", got \"{}\"",
                        lyric_word, word_timings[*timing_index].word
                    ),
                    suggested_word: Some(lyric_word.clone()),
                    similarity: Some(*similarity),
                });
            }
            AlignmentEdge::ExtraTiming { timing_index } => {
                if let Some(flags) = word_flags.get_mut(*timing_index) {
                    flags.push(Flag::new(FlagKind::ExtraWord, "Extra word not in lyrics"));
                }
            }
            AlignmentEdge::MissingTiming { .. } => missing_word += 1,
            AlignmentEdge::Match { .. } => {}
        }
    }

    let mut flag_counts = FlagCounts {
        missing_word,
        ..FlagCounts::default()
    };
    for flag in word_flags.iter().flatten() {
        flag_counts.record(flag.kind);
    }

    FlagReport {
        word_flags,
        alignment,
        total_flags: flag_counts.total(),
        flag_counts,
    }
}

/// Duration and overlap checks for one entry. Needs no alignment.
fn timing_flags(
    config: &FlagConfig,
    word_timings: &[WordTiming],
    index: usize,
    timing: &WordTiming,
) -> Vec<Flag> {
    let mut flags = Vec::new();

    let duration = timing.duration();
    if duration > config.long_seconds {
        flags.push(Flag::new(
            FlagKind::TimingLong,
            format!("Duration {:.2}s > {}s", duration, config.long_seconds),
        ));
    }
    // NaN durations land here too rather than escaping both checks.
    if duration < config.short_seconds || duration.is_nan() {
        flags.push(Flag::new(
            FlagKind::TimingShort,
            format!(
                "Duration {:.0}ms < {:.0}ms",
                duration * 1000.0,
                config.short_seconds * 1000.0
            ),
        ));
    }

    // Only the immediate successor by index is compared.
    if let Some(next) = word_timings.get(index + 1) {
        if timing.end > next.start + config.overlap_tolerance {
            flags.push(Flag::new(
                FlagKind::Overlap,
                format!("Overlaps with \"{}\"", next.word),
            ));
        }
    }

    flags
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn song(lyrics: Option<&str>, words: Vec<WordTiming>) -> SongData {
        SongData {
            lyrics_text: lyrics.map(str::to_string),
            word_timings: words,
            ..SongData::default()
        }
    }

    fn kinds_at(report: &FlagReport, index: usize) -> Vec<FlagKind> {
        report.word_flags[index].iter().map(|f| f.kind).collect()
    }

    #[test]
    fn test_clean_song() {
        let report = generate_flags(&song(
            Some("hello world"),
            vec![WordTiming::new("hello", 0.0, 0.5), WordTiming::new("world", 0.5, 1.0)],
        ));
        assert_eq!(report.alignment.len(), 2);
        assert!(report.alignment.iter().all(|e| e.kind() == "match"));
        assert_eq!(report.word_flags, vec![Vec::<Flag>::new(), Vec::new()]);
        assert_eq!(report.flag_counts, FlagCounts::default());
        assert_eq!(report.total_flags, 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_boundary_similarity_is_not_flagged() {
        let report = generate_flags(&song(
            Some("hello world"),
            vec![WordTiming::new("helo", 0.0, 0.5), WordTiming::new("world", 0.5, 1.0)],
        ));
        assert_eq!(report.alignment[0].kind(), "match");
        assert_eq!(report.total_flags, 0);
    }

    #[test]
    fn test_text_mismatch_carries_suggestion() {
        let report = generate_flags(&song(
            Some("oh baby"),
            vec![WordTiming::new("oh", 0.0, 0.5), WordTiming::new("babe", 0.5, 1.0)],
        ));
        assert_eq!(kinds_at(&report, 1), vec![FlagKind::TextMismatch]);
        let flag = &report.word_flags[1][0];
        assert_eq!(flag.suggested_word.as_deref(), Some("baby"));
        assert_eq!(flag.similarity, Some(0.75));
        assert_eq!(flag.message, "Expected \"baby\", got \"babe\"");
        assert_eq!(report.suggestion_for(1), Some("baby"));
        assert_eq!(report.flag_counts.text_mismatch, 1);
    }

    #[test]
    fn test_timing_long() {
        let report = generate_flags(&song(None, vec![WordTiming::new("long", 0.0, 5.0)]));
        assert_eq!(kinds_at(&report, 0), vec![FlagKind::TimingLong]);
        assert_eq!(report.word_flags[0][0].message, "Duration 5.00s > 3s");
    }

    #[test]
    fn test_timing_short() {
        let report = generate_flags(&song(None, vec![WordTiming::new("blip", 0.0, 0.01)]));
        assert_eq!(kinds_at(&report, 0), vec![FlagKind::TimingShort]);
        assert_eq!(report.word_flags[0][0].message, "Duration 10ms < 30ms");
    }

    #[test]
    fn test_degenerate_durations_are_short() {
        let report = generate_flags(&song(
            None,
            vec![
                WordTiming::new("zero", 1.0, 1.0),
                WordTiming::new("negative", 3.0, 2.5),
                WordTiming::new("unknown", f64::NAN, 4.0),
            ],
        ));
        assert_eq!(kinds_at(&report, 0), vec![FlagKind::TimingShort]);
        assert_eq!(kinds_at(&report, 1), vec![FlagKind::TimingShort]);
        assert_eq!(report.word_flags[1][0].message, "Duration -500ms < 30ms");
        assert_eq!(kinds_at(&report, 2), vec![FlagKind::TimingShort]);
        assert_eq!(report.flag_counts.timing_short, 3);
    }

    #[test]
    fn test_overlap_flags_earlier_word_only() {
        let report = generate_flags(&song(
            None,
            vec![WordTiming::new("a", 0.0, 1.0), WordTiming::new("b", 0.9, 1.5)],
        ));
        assert_eq!(kinds_at(&report, 0), vec![FlagKind::Overlap]);
        assert_eq!(report.word_flags[0][0].message, "Overlaps with \"b\"");
        assert!(report.word_flags[1].is_empty());
    }

    #[test]
    fn test_overlap_within_tolerance_is_ignored() {
        let report = generate_flags(&song(
            None,
            vec![WordTiming::new("a", 0.0, 1.005), WordTiming::new("b", 1.0, 1.5)],
        ));
        assert!(report.is_clean());
    }

    #[test]
    fn test_overlap_only_checks_next_index() {
        // "a" overlaps "c" but not its index neighbour "b"
        let report = generate_flags(&song(
            None,
            vec![
                WordTiming::new("a", 0.0, 2.0),
                WordTiming::new("b", 2.5, 3.0),
                WordTiming::new("c", 1.0, 1.5),
            ],
        ));
        assert!(report.word_flags[0].is_empty());
        assert_eq!(kinds_at(&report, 1), vec![FlagKind::Overlap]);
        assert!(report.word_flags[2].is_empty());
    }

    #[test]
    fn test_missing_word_counted_separately() {
        let report = generate_flags(&song(
            Some("one two three"),
            vec![WordTiming::new("one", 0.0, 0.5), WordTiming::new("three", 1.0, 1.5)],
        ));
        let missing: Vec<_> = report
            .alignment
            .iter()
            .filter(|e| e.kind() == "missing_timing")
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].lyric_word(), Some("two"));
        assert_eq!(report.flag_counts.missing_word, 1);
        assert_eq!(report.total_flags, 1);
        assert!(report.word_flags.iter().all(|f| f.is_empty()));
    }

    #[test]
    fn test_extra_word() {
        let report = generate_flags(&song(
            Some("one three"),
            vec![
                WordTiming::new("one", 0.0, 0.5),
                WordTiming::new("uh", 0.5, 1.0),
                WordTiming::new("three", 1.0, 1.5),
            ],
        ));
        assert_eq!(kinds_at(&report, 1), vec![FlagKind::ExtraWord]);
        assert_eq!(report.flag_counts.extra_word, 1);
    }

    #[test]
    fn test_multiple_flags_on_one_word() {
        let report = generate_flags(&song(
            Some("oh baby"),
            vec![WordTiming::new("oh", 0.0, 0.5), WordTiming::new("babe", 0.5, 4.0)],
        ));
        assert_eq!(
            kinds_at(&report, 1),
            vec![FlagKind::TimingLong, FlagKind::TextMismatch]
        );
        assert_eq!(report.total_flags, 2);
    }

    #[test]
    fn test_timing_checks_run_without_lyrics() {
        for lyrics in [None, Some("")] {
            let report = generate_flags(&song(
                lyrics,
                vec![WordTiming::new("a", 0.0, 5.0), WordTiming::new("b", 4.0, 4.5)],
            ));
            assert!(report.alignment.is_empty());
            assert_eq!(report.flag_counts.timing_long, 1);
            assert_eq!(report.flag_counts.overlap, 1);
            assert_eq!(report.flag_counts.extra_word, 0);
            assert_eq!(report.total_flags, 2);
        }
    }

    #[test]
    fn test_empty_timings() {
        let report = generate_flags(&song(Some("some lyrics here"), Vec::new()));
        assert!(report.word_flags.is_empty());
        assert!(report.alignment.is_empty());
        assert_eq!(report.total_flags, 0);
    }

    #[test]
    fn test_report_shape_and_determinism() {
        let data = song(
            Some("we will we will rock you"),
            vec![
                WordTiming::new("we", 0.0, 0.3),
                WordTiming::new("we'll", 0.3, 0.6),
                WordTiming::new("we", 0.55, 0.9),
                WordTiming::new("rock", 1.2, 1.21),
                WordTiming::new("rock", 1.3, 1.6),
                WordTiming::new("ya", 1.6, 5.0),
            ],
        );
        let first = generate_flags(&data);
        let second = generate_flags(&data);
        assert_eq!(first.word_flags.len(), data.word_timings.len());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );

        let mut recount = FlagCounts {
            missing_word: first.flag_counts.missing_word,
            ..FlagCounts::default()
        };
        for flag in first.word_flags.iter().flatten() {
            assert!(FlagKind::ALL.contains(&flag.kind));
            recount.record(flag.kind);
        }
        assert_eq!(recount, first.flag_counts);
        assert_eq!(first.total_flags, first.flag_counts.total());
    }

    #[test]
    fn test_report_json_field_names() {
        let report = generate_flags(&song(Some("a"), vec![WordTiming::new("a", 0.0, 0.5)]));
        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("wordFlags").is_some());
        assert!(value.get("alignment").is_some());
        assert_eq!(value["flagCounts"]["missing_word"], 0);
        assert_eq!(value["totalFlags"], 0);
    }

    #[test]
    fn test_custom_thresholds() {
        let config = FlagConfig {
            long_seconds: 1.0,
            ..FlagConfig::default()
        };
        let report = generate_flags_with(&config, None, &[WordTiming::new("held", 0.0, 2.0)]);
        assert_eq!(kinds_at(&report, 0), vec![FlagKind::TimingLong]);
        assert_eq!(report.word_flags[0][0].message, "Duration 2.00s > 1s");
    }
}
