//! Core data models for lyric alignment and flagging.
//!
//! This module contains the value types that flow through the aligner and
//! the flag generator. All of them are recomputed from scratch on every pass;
//! nothing here has identity beyond a single invocation except the positional
//! index of a `WordTiming` inside its song.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::song::LooseField;

// ============================================================================
// Input Models
// ============================================================================

/// One observed spoken/sung word instance.
///
/// `end > start` is expected but not validated. Fields the core does not know
/// about are kept in `extra` and written back untouched.
///
/// Hand-edited files are common, so a bad value in one word never rejects
/// the song: unusable times load as NaN (and get flagged), a track lane
/// outside `0..=255` loads as `None`, and a speaker may be any JSON value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    #[serde(default)]
    pub word: String,
    #[serde(default = "unknown_time", deserialize_with = "lenient_time")]
    pub start: f64,
    #[serde(default = "unknown_time", deserialize_with = "lenient_time")]
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<LooseField>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_lane")]
    pub track: Option<u8>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WordTiming {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
            speaker: None,
            track: None,
            extra: Map::new(),
        }
    }

    /// Duration in seconds. Zero or negative for degenerate entries.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

fn unknown_time() -> f64 {
    f64::NAN
}

/// Numbers pass through, numeric strings are parsed, anything else is NaN.
fn lenient_time<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    })
}

/// Lanes are small non-negative integers; anything else means "no lane".
fn lenient_lane<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?
        .as_u64()
        .and_then(|lane| u8::try_from(lane).ok()))
}

/// One whitespace-delimited token of the lyrics transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LyricToken {
    pub index: usize,
    pub text: String,
}

// ============================================================================
// Alignment Models
// ============================================================================

/// One step of the optimal alignment path.
///
/// Edges that touch a timing entry carry its positional index into the
/// caller's `word_timings`, never a copy of the entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AlignmentEdge {
    Match {
        lyric_index: usize,
        lyric_word: String,
        timing_index: usize,
        similarity: f64,
    },
    Mismatch {
        lyric_index: usize,
        lyric_word: String,
        timing_index: usize,
        similarity: f64,
    },
    MissingTiming {
        lyric_index: usize,
        lyric_word: String,
    },
    ExtraTiming {
        timing_index: usize,
    },
}

impl AlignmentEdge {
    pub fn timing_index(&self) -> Option<usize> {
        match self {
            AlignmentEdge::Match { timing_index, .. }
            | AlignmentEdge::Mismatch { timing_index, .. }
            | AlignmentEdge::ExtraTiming { timing_index } => Some(*timing_index),
            AlignmentEdge::MissingTiming { .. } => None,
        }
    }

    pub fn lyric_index(&self) -> Option<usize> {
        match self {
            AlignmentEdge::Match { lyric_index, .. }
            | AlignmentEdge::Mismatch { lyric_index, .. }
            | AlignmentEdge::MissingTiming { lyric_index, .. } => Some(*lyric_index),
            AlignmentEdge::ExtraTiming { .. } => None,
        }
    }

    pub fn lyric_word(&self) -> Option<&str> {
        match self {
            AlignmentEdge::Match { lyric_word, .. }
            | AlignmentEdge::Mismatch { lyric_word, .. }
            | AlignmentEdge::MissingTiming { lyric_word, .. } => Some(lyric_word),
            AlignmentEdge::ExtraTiming { .. } => None,
        }
    }

    pub fn similarity(&self) -> Option<f64> {
        match self {
            AlignmentEdge::Match { similarity, .. } | AlignmentEdge::Mismatch { similarity, .. } => {
                Some(*similarity)
            }
            _ => None,
        }
    }

    /// Wire name of the edge kind, as used in JSON and report tables.
    pub fn kind(&self) -> &'static str {
        match self {
            AlignmentEdge::Match { .. } => "match",
            AlignmentEdge::Mismatch { .. } => "mismatch",
            AlignmentEdge::MissingTiming { .. } => "missing_timing",
            AlignmentEdge::ExtraTiming { .. } => "extra_timing",
        }
    }
}

// ============================================================================
// Flag Models
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    TextMismatch,
    TimingLong,
    TimingShort,
    Overlap,
    ExtraWord,
}

impl FlagKind {
    pub const ALL: [FlagKind; 5] = [
        FlagKind::TextMismatch,
        FlagKind::TimingLong,
        FlagKind::TimingShort,
        FlagKind::Overlap,
        FlagKind::ExtraWord,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FlagKind::TextMismatch => "text_mismatch",
            FlagKind::TimingLong => "timing_long",
            FlagKind::TimingShort => "timing_short",
            FlagKind::Overlap => "overlap",
            FlagKind::ExtraWord => "extra_word",
        }
    }
}

/// A quality-control annotation attached to one timing index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    #[serde(rename = "type")]
    pub kind: FlagKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_word: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

impl Flag {
    pub fn new(kind: FlagKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggested_word: None,
            similarity: None,
        }
    }
}

/// Aggregate flag counts. Always zero-filled, never sparse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCounts {
    pub text_mismatch: usize,
    pub timing_long: usize,
    pub timing_short: usize,
    pub overlap: usize,
    pub extra_word: usize,
    /// Lyric tokens with no timing entry; these have no index to attach to.
    pub missing_word: usize,
}

impl FlagCounts {
    pub fn record(&mut self, kind: FlagKind) {
        match kind {
            FlagKind::TextMismatch => self.text_mismatch += 1,
            FlagKind::TimingLong => self.timing_long += 1,
            FlagKind::TimingShort => self.timing_short += 1,
            FlagKind::Overlap => self.overlap += 1,
            FlagKind::ExtraWord => self.extra_word += 1,
        }
    }

    pub fn get(&self, kind: FlagKind) -> usize {
        match kind {
            FlagKind::TextMismatch => self.text_mismatch,
            FlagKind::TimingLong => self.timing_long,
            FlagKind::TimingShort => self.timing_short,
            FlagKind::Overlap => self.overlap,
            FlagKind::ExtraWord => self.extra_word,
        }
    }

    /// Sum of all six counters.
    pub fn total(&self) -> usize {
        self.text_mismatch
            + self.timing_long
            + self.timing_short
            + self.overlap
            + self.extra_word
            + self.missing_word
    }

    /// Short per-song summary labels ("2 mismatch", "1 timing", "Clean").
    pub fn badges(&self) -> Vec<String> {
        let mut badges = Vec::new();
        if self.text_mismatch > 0 {
            badges.push(format!("{} mismatch", self.text_mismatch));
        }
        let timing = self.timing_long + self.timing_short;
        if timing > 0 {
            badges.push(format!("{} timing", timing));
        }
        if self.overlap > 0 {
            badges.push(format!("{} overlap", self.overlap));
        }
        if badges.is_empty() && self.total() == 0 {
            badges.push("Clean".to_string());
        }
        badges
    }
}

/// Full output of one flagging pass.
///
/// `word_flags` is index-aligned with the input `word_timings`; an empty
/// inner list means the word is clean.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagReport {
    pub word_flags: Vec<Vec<Flag>>,
    pub alignment: Vec<AlignmentEdge>,
    pub flag_counts: FlagCounts,
    pub total_flags: usize,
}

impl FlagReport {
    pub fn is_clean(&self) -> bool {
        self.total_flags == 0
    }

    /// Indices of timing entries carrying at least one flag.
    pub fn flagged_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.word_flags
            .iter()
            .enumerate()
            .filter(|(_, flags)| !flags.is_empty())
            .map(|(i, _)| i)
    }

    /// First replacement suggested for a word, if any flag carries one.
    pub fn suggestion_for(&self, index: usize) -> Option<&str> {
        self.word_flags
            .get(index)?
            .iter()
            .find_map(|f| f.suggested_word.as_deref())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_timing_passes_unknown_fields_through() {
        let json = r#"{"word":"hi","start":0.5,"end":1.0,"confidence":0.93,"track":1}"#;
        let timing: WordTiming = serde_json::from_str(json).unwrap();
        assert_eq!(timing.word, "hi");
        assert_eq!(timing.track, Some(1));
        assert_eq!(timing.extra.get("confidence"), Some(&serde_json::json!(0.93)));

        let back = serde_json::to_value(&timing).unwrap();
        assert_eq!(back["confidence"], serde_json::json!(0.93));
        assert!(back.get("speaker").is_none());
    }

    #[test]
    fn test_alignment_edge_wire_format() {
        let edge = AlignmentEdge::Mismatch {
            lyric_index: 0,
            lyric_word: "baby".to_string(),
            timing_index: 3,
            similarity: 0.75,
        };
        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(value["type"], "mismatch");
        assert_eq!(value["timingIndex"], 3);
        assert_eq!(value["lyricWord"], "baby");

        let extra = serde_json::to_value(AlignmentEdge::ExtraTiming { timing_index: 1 }).unwrap();
        assert_eq!(extra, serde_json::json!({"type": "extra_timing", "timingIndex": 1}));
    }

    #[test]
    fn test_flag_wire_format() {
        let mut flag = Flag::new(FlagKind::TextMismatch, "Expected \"baby\", got \"babe\"");
        flag.suggested_word = Some("baby".to_string());
        let value = serde_json::to_value(&flag).unwrap();
        assert_eq!(value["type"], "text_mismatch");
        assert_eq!(value["suggestedWord"], "baby");
        assert!(value.get("similarity").is_none());
    }

    #[test]
    fn test_flag_counts_total_and_badges() {
        let mut counts = FlagCounts::default();
        assert_eq!(counts.badges(), vec!["Clean".to_string()]);

        counts.record(FlagKind::TimingLong);
        counts.record(FlagKind::TimingShort);
        counts.record(FlagKind::TextMismatch);
        counts.missing_word = 2;
        assert_eq!(counts.total(), 5);
        assert_eq!(counts.get(FlagKind::TimingShort), 1);
        assert_eq!(
            counts.badges(),
            vec!["1 mismatch".to_string(), "2 timing".to_string()]
        );

        // Missing words alone produce no badge but the song is not clean either.
        let only_missing = FlagCounts {
            missing_word: 1,
            ..FlagCounts::default()
        };
        assert!(only_missing.badges().is_empty());
    }

    #[test]
    fn test_flag_kind_names_match_serde() {
        for kind in FlagKind::ALL {
            let value = serde_json::to_value(kind).unwrap();
            assert_eq!(value, serde_json::json!(kind.as_str()));
        }
    }
}
