//! Editing session for one song.
//!
//! `EditorSession` owns the song being reviewed, its per-word track lanes and
//! a bounded undo/redo history. Every edit that touches word timings rebuilds
//! the flag report from a full pass: indices shift on delete/merge/split, so
//! flags are never patched in place.

use std::collections::VecDeque;
use std::path::Path;

use rustc_hash::FxHashSet;

use crate::error::{QcError, Result};
use crate::flags::{generate_flags_with, FlagConfig};
use crate::models::{FlagKind, FlagReport, WordTiming};
use crate::song::{load_song, save_song, SongData};

/// Maximum number of undo steps kept per session
pub const MAX_HISTORY_SIZE: usize = 50;

/// Seconds of slack when jumping between flagged words from a playhead
const NAVIGATION_SLACK_SECONDS: f64 = 0.1;

// ============================================================================
// History
// ============================================================================

/// State captured before an edit.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub word_timings: Vec<WordTiming>,
    pub word_tracks: Vec<u8>,
}

/// Bounded undo stack plus redo stack. The oldest undo step is dropped once
/// `capacity` is reached; recording a new edit clears redo.
#[derive(Debug)]
pub struct History {
    capacity: usize,
    undo: VecDeque<Snapshot>,
    redo: Vec<Snapshot>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            undo: VecDeque::with_capacity(capacity),
            redo: Vec::new(),
        }
    }

    pub fn record(&mut self, snapshot: Snapshot) {
        self.push_undo(snapshot);
        self.redo.clear();
    }

    /// Pop the last undo step, parking `current` on the redo stack.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let previous = self.undo.pop_back()?;
        self.redo.push(current);
        Some(previous)
    }

    /// Pop the last redo step, parking `current` on the undo stack.
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let next = self.redo.pop()?;
        self.push_undo(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    fn push_undo(&mut self, snapshot: Snapshot) {
        if self.capacity == 0 {
            return;
        }
        if self.undo.len() == self.capacity {
            self.undo.pop_front();
        }
        self.undo.push_back(snapshot);
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(MAX_HISTORY_SIZE)
    }
}

// ============================================================================
// Edits
// ============================================================================

/// Partial update for one word. `None` fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WordUpdate {
    pub word: Option<String>,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl WordUpdate {
    fn apply(&self, timing: &mut WordTiming) {
        if let Some(word) = &self.word {
            timing.word = word.clone();
        }
        if let Some(start) = self.start {
            timing.start = start;
        }
        if let Some(end) = self.end {
            timing.end = end;
        }
    }
}

// ============================================================================
// Session
// ============================================================================

pub struct EditorSession {
    song: SongData,
    word_tracks: Vec<u8>,
    reviewed: bool,
    dirty: bool,
    config: FlagConfig,
    report: FlagReport,
    history: History,
}

impl EditorSession {
    pub fn new(song: SongData) -> Self {
        Self::with_config(song, FlagConfig::default())
    }

    pub fn with_config(song: SongData, config: FlagConfig) -> Self {
        let word_tracks = song
            .word_timings
            .iter()
            .map(|t| t.track.unwrap_or(0))
            .collect();
        let reviewed = song.reviewed.unwrap_or(false);
        let mut session = Self {
            song,
            word_tracks,
            reviewed,
            dirty: false,
            config,
            report: FlagReport::default(),
            history: History::default(),
        };
        session.regenerate_flags();
        session
    }

    pub fn open(path: &Path, config: FlagConfig) -> Result<Self> {
        Ok(Self::with_config(load_song(path)?, config))
    }

    /// Write the song back with track lanes and review status folded in.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        save_song(path, &self.to_song_data())?;
        self.dirty = false;
        Ok(())
    }

    pub fn to_song_data(&self) -> SongData {
        let mut song = self.song.clone();
        for (timing, lane) in song.word_timings.iter_mut().zip(&self.word_tracks) {
            timing.track = Some(*lane);
        }
        song.reviewed = Some(self.reviewed);
        song
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn song(&self) -> &SongData {
        &self.song
    }

    pub fn word_timings(&self) -> &[WordTiming] {
        &self.song.word_timings
    }

    pub fn word_tracks(&self) -> &[u8] {
        &self.word_tracks
    }

    pub fn report(&self) -> &FlagReport {
        &self.report
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_reviewed(&self) -> bool {
        self.reviewed
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Rebuild the flag report from scratch.
    pub fn regenerate_flags(&mut self) {
        self.report = generate_flags_with(
            &self.config,
            self.song.lyrics_text.as_deref(),
            &self.song.word_timings,
        );
    }

    // ------------------------------------------------------------------------
    // Word edits
    // ------------------------------------------------------------------------

    pub fn update_word(&mut self, index: usize, update: WordUpdate) -> Result<()> {
        self.check_index(index)?;
        self.checkpoint();
        update.apply(&mut self.song.word_timings[index]);
        self.commit();
        Ok(())
    }

    /// Delete the given words. Returns how many were removed.
    pub fn delete_words(&mut self, indices: &[usize]) -> Result<usize> {
        for &index in indices {
            self.check_index(index)?;
        }
        let doomed: FxHashSet<usize> = indices.iter().copied().collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        self.checkpoint();
        let (timings, tracks): (Vec<_>, Vec<_>) = std::mem::take(&mut self.song.word_timings)
            .into_iter()
            .zip(std::mem::take(&mut self.word_tracks))
            .enumerate()
            .filter(|(i, _)| !doomed.contains(i))
            .map(|(_, pair)| pair)
            .unzip();
        self.song.word_timings = timings;
        self.word_tracks = tracks;
        self.commit();
        Ok(doomed.len())
    }

    /// Merge two or more consecutive words into the first one.
    /// Texts are concatenated without separator; the span covers all parts.
    pub fn merge_words(&mut self, indices: &[usize]) -> Result<usize> {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() < 2 || sorted.windows(2).any(|w| w[1] != w[0] + 1) {
            return Err(QcError::NotConsecutive(indices.to_vec()));
        }
        let first = sorted[0];
        let last = sorted[sorted.len() - 1];
        self.check_index(last)?;

        self.checkpoint();
        let parts: Vec<WordTiming> = self.song.word_timings.drain(first..=last).collect();
        self.word_tracks.drain(first + 1..=last);

        let mut merged = parts[0].clone();
        merged.word = parts.iter().map(|p| p.word.as_str()).collect();
        merged.start = parts.iter().map(|p| p.start).fold(f64::INFINITY, f64::min);
        merged.end = parts.iter().map(|p| p.end).fold(f64::NEG_INFINITY, f64::max);
        self.song.word_timings.insert(first, merged);

        self.commit();
        Ok(first)
    }

    /// Split a word at a character position. The split time is placed
    /// proportionally to the character ratio.
    pub fn split_word(&mut self, index: usize, position: usize) -> Result<()> {
        self.check_index(index)?;
        let original = self.song.word_timings[index].clone();
        let char_count = original.word.chars().count();
        if position == 0 || position >= char_count {
            return Err(QcError::InvalidSplit {
                word: original.word,
                position,
            });
        }

        let byte_at = original
            .word
            .char_indices()
            .nth(position)
            .map(|(b, _)| b)
            .unwrap_or(original.word.len());
        let ratio = position as f64 / char_count as f64;
        let split_time = original.start + original.duration() * ratio;

        let mut head = original.clone();
        head.word = original.word[..byte_at].to_string();
        head.end = split_time;
        let mut tail = original.clone();
        tail.word = original.word[byte_at..].to_string();
        tail.start = split_time;

        self.checkpoint();
        self.song.word_timings[index] = head;
        self.song.word_timings.insert(index + 1, tail);
        let lane = self.word_tracks[index];
        self.word_tracks.insert(index + 1, lane);
        self.commit();
        Ok(())
    }

    /// Pull the end of every overlapping word back to just before the next
    /// word, unless that would make it shorter than the short-word threshold.
    /// Returns the number of words fixed.
    pub fn auto_fix_overlaps(&mut self) -> usize {
        let mut timings = self.song.word_timings.clone();
        let mut fixed = 0;

        for (i, flags) in self.report.word_flags.iter().enumerate() {
            if !flags.iter().any(|f| f.kind == FlagKind::Overlap) || i + 1 >= timings.len() {
                continue;
            }
            let new_end = timings[i + 1].start - self.config.overlap_tolerance;
            if new_end - timings[i].start >= self.config.short_seconds {
                timings[i].end = new_end;
                fixed += 1;
            }
        }

        if fixed > 0 {
            self.checkpoint();
            self.song.word_timings = timings;
            self.commit();
        }
        fixed
    }

    /// Replace a word with the lyric token suggested by its mismatch flag.
    pub fn accept_suggestion(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        let suggestion = self
            .report
            .suggestion_for(index)
            .map(str::to_string)
            .ok_or(QcError::NoSuggestion(index))?;
        self.update_word(
            index,
            WordUpdate {
                word: Some(suggestion),
                ..WordUpdate::default()
            },
        )
    }

    /// Accept every pending suggestion as a single undo step.
    /// Returns the number of words replaced.
    pub fn accept_all_suggestions(&mut self) -> usize {
        let replacements: Vec<(usize, String)> = (0..self.song.word_timings.len())
            .filter_map(|i| self.report.suggestion_for(i).map(|s| (i, s.to_string())))
            .filter(|(i, s)| self.song.word_timings[*i].word != *s)
            .collect();
        if replacements.is_empty() {
            return 0;
        }

        self.checkpoint();
        for (index, word) in &replacements {
            self.song.word_timings[*index].word = word.clone();
        }
        self.commit();
        replacements.len()
    }

    pub fn move_words_to_track(&mut self, indices: &[usize], lane: u8) -> Result<()> {
        for &index in indices {
            self.check_index(index)?;
        }
        self.checkpoint();
        for &index in indices {
            self.word_tracks[index] = lane;
        }
        self.dirty = true;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Undo / redo
    // ------------------------------------------------------------------------

    pub fn undo(&mut self) -> Result<()> {
        let current = self.snapshot();
        let previous = self
            .history
            .undo(current)
            .ok_or(QcError::EmptyHistory("undo"))?;
        self.restore(previous);
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        let current = self.snapshot();
        let next = self
            .history
            .redo(current)
            .ok_or(QcError::EmptyHistory("redo"))?;
        self.restore(next);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Pitch edits (not part of the undo history)
    // ------------------------------------------------------------------------

    /// Assign a note to every pitch sample in `[start, end]`. Returns the count.
    pub fn set_pitch_for_range(
        &mut self,
        start: f64,
        end: f64,
        midi_note: f64,
        note_name: &str,
    ) -> usize {
        self.edit_pitch_range(start, end, Some(midi_note), Some(note_name))
    }

    /// Clear the note of every pitch sample in `[start, end]`. Returns the count.
    pub fn clear_pitch_for_range(&mut self, start: f64, end: f64) -> usize {
        self.edit_pitch_range(start, end, None, None)
    }

    fn edit_pitch_range(
        &mut self,
        start: f64,
        end: f64,
        midi: Option<f64>,
        name: Option<&str>,
    ) -> usize {
        let mut touched = 0;
        for point in self
            .song
            .pitch_data
            .iter_mut()
            .filter(|p| p.time >= start && p.time <= end)
        {
            point.midi_note = midi;
            point.note_name = name.map(str::to_string);
            touched += 1;
        }
        if touched > 0 {
            self.dirty = true;
        }
        touched
    }

    // ------------------------------------------------------------------------
    // Navigation & review
    // ------------------------------------------------------------------------

    /// First flagged word starting after `time`, wrapping to the first flagged word.
    pub fn next_flagged(&self, time: f64) -> Option<usize> {
        let timings = &self.song.word_timings;
        self.report
            .flagged_indices()
            .find(|&i| timings[i].start > time + NAVIGATION_SLACK_SECONDS)
            .or_else(|| self.report.flagged_indices().next())
    }

    /// Last flagged word starting before `time`, wrapping to the last flagged word.
    pub fn prev_flagged(&self, time: f64) -> Option<usize> {
        let timings = &self.song.word_timings;
        let flagged: Vec<usize> = self.report.flagged_indices().collect();
        flagged
            .iter()
            .rev()
            .find(|&&i| timings[i].start < time - NAVIGATION_SLACK_SECONDS)
            .or_else(|| flagged.last())
            .copied()
    }

    pub fn toggle_reviewed(&mut self) -> bool {
        self.reviewed = !self.reviewed;
        self.dirty = true;
        self.reviewed
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn check_index(&self, index: usize) -> Result<()> {
        let len = self.song.word_timings.len();
        if index < len {
            Ok(())
        } else {
            Err(QcError::IndexOutOfRange { index, len })
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            word_timings: self.song.word_timings.clone(),
            word_tracks: self.word_tracks.clone(),
        }
    }

    fn checkpoint(&mut self) {
        let snapshot = self.snapshot();
        self.history.record(snapshot);
    }

    fn commit(&mut self) {
        self.dirty = true;
        self.regenerate_flags();
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.song.word_timings = snapshot.word_timings;
        self.word_tracks = snapshot.word_tracks;
        self.commit();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::PitchPoint;
    use serde_json::Map;

    fn session(lyrics: &str, words: &[(&str, f64, f64)]) -> EditorSession {
        EditorSession::new(SongData {
            lyrics_text: Some(lyrics.to_string()),
            word_timings: words
                .iter()
                .map(|(w, s, e)| WordTiming::new(*w, *s, *e))
                .collect(),
            ..SongData::default()
        })
    }

    fn words(s: &EditorSession) -> Vec<&str> {
        s.word_timings().iter().map(|t| t.word.as_str()).collect()
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = History::new(3);
        for i in 0..5u8 {
            history.record(Snapshot {
                word_timings: Vec::new(),
                word_tracks: vec![i],
            });
        }
        assert_eq!(history.undo_len(), 3);

        let current = Snapshot {
            word_timings: Vec::new(),
            word_tracks: vec![9],
        };
        let restored = history.undo(current).unwrap();
        assert_eq!(restored.word_tracks, vec![4]);
        assert!(history.can_redo());

        history.record(restored);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_session_bounds_undo_depth() {
        let mut s = session("a", &[("a", 0.0, 0.5)]);
        for i in 0..(MAX_HISTORY_SIZE + 10) {
            let update = WordUpdate {
                end: Some(0.5 + i as f64 * 0.001),
                ..WordUpdate::default()
            };
            s.update_word(0, update).unwrap();
        }
        let mut undone = 0;
        while s.undo().is_ok() {
            undone += 1;
        }
        assert_eq!(undone, MAX_HISTORY_SIZE);
    }

    #[test]
    fn test_update_word_regenerates_flags() {
        let mut s = session("oh baby", &[("oh", 0.0, 0.5), ("babe", 0.5, 1.0)]);
        assert_eq!(s.report().flag_counts.text_mismatch, 1);

        s.accept_suggestion(1).unwrap();
        assert_eq!(words(&s), vec!["oh", "baby"]);
        assert!(s.report().is_clean());
        assert!(s.is_dirty());

        assert!(matches!(s.accept_suggestion(0), Err(QcError::NoSuggestion(0))));
        assert!(matches!(
            s.accept_suggestion(7),
            Err(QcError::IndexOutOfRange { index: 7, len: 2 })
        ));
    }

    #[test]
    fn test_undo_redo_roundtrip() {
        let mut s = session("oh baby", &[("oh", 0.0, 0.5), ("babe", 0.5, 1.0)]);
        assert!(matches!(s.undo(), Err(QcError::EmptyHistory("undo"))));

        s.accept_suggestion(1).unwrap();
        s.undo().unwrap();
        assert_eq!(words(&s), vec!["oh", "babe"]);
        assert_eq!(s.report().flag_counts.text_mismatch, 1);

        s.redo().unwrap();
        assert_eq!(words(&s), vec!["oh", "baby"]);
        assert!(s.report().is_clean());
        assert!(!s.can_redo());
    }

    #[test]
    fn test_delete_words_reindexes_flags() {
        let mut s = session(
            "one two",
            &[("one", 0.0, 0.5), ("uh", 0.5, 1.0), ("two", 1.0, 1.5)],
        );
        assert_eq!(s.report().flag_counts.extra_word, 1);
        s.move_words_to_track(&[2], 1).unwrap();

        assert_eq!(s.delete_words(&[1]).unwrap(), 1);
        assert_eq!(words(&s), vec!["one", "two"]);
        assert_eq!(s.word_tracks(), &[0, 1]);
        assert_eq!(s.report().word_flags.len(), 2);
        assert!(s.report().is_clean());

        assert!(s.delete_words(&[5]).is_err());
        assert_eq!(s.delete_words(&[]).unwrap(), 0);
    }

    #[test]
    fn test_merge_words() {
        let mut s = session(
            "something",
            &[("some", 0.0, 0.4), ("thing", 0.45, 0.9), ("else", 1.0, 1.2)],
        );
        assert_eq!(s.merge_words(&[1, 0]).unwrap(), 0);
        assert_eq!(words(&s), vec!["something", "else"]);
        assert_eq!(s.word_timings()[0].start, 0.0);
        assert_eq!(s.word_timings()[0].end, 0.9);
        assert_eq!(s.word_tracks().len(), 2);
        assert_eq!(s.report().flag_counts.extra_word, 1);

        assert!(matches!(s.merge_words(&[0]), Err(QcError::NotConsecutive(_))));
        let mut t = session("a b c", &[("a", 0.0, 0.2), ("b", 0.3, 0.5), ("c", 0.6, 0.8)]);
        assert!(matches!(t.merge_words(&[0, 2]), Err(QcError::NotConsecutive(_))));
        assert!(matches!(t.merge_words(&[2, 3]), Err(QcError::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_split_word() {
        let mut s = session("every body", &[("everybody", 1.0, 1.9)]);
        s.split_word(0, 5).unwrap();
        assert_eq!(words(&s), vec!["every", "body"]);
        let split = 1.0 + (1.9 - 1.0) * (5.0 / 9.0);
        assert_eq!(s.word_timings()[0].end, split);
        assert_eq!(s.word_timings()[1].start, split);
        assert_eq!(s.word_timings()[1].end, 1.9);
        assert_eq!(s.word_tracks(), &[0, 0]);
        assert!(s.report().is_clean());

        assert!(matches!(s.split_word(0, 0), Err(QcError::InvalidSplit { .. })));
        assert!(matches!(s.split_word(0, 5), Err(QcError::InvalidSplit { .. })));
    }

    #[test]
    fn test_split_word_respects_char_boundaries() {
        let mut s = session("café olé", &[("caféolé", 0.0, 0.7)]);
        s.split_word(0, 4).unwrap();
        assert_eq!(words(&s), vec!["café", "olé"]);
    }

    #[test]
    fn test_auto_fix_overlaps() {
        let mut s = session(
            "a b c",
            &[("a", 0.0, 1.0), ("b", 0.9, 1.5), ("c", 0.91, 2.0)],
        );
        // "a" can be pulled back; "b" would be left shorter than 30ms
        assert_eq!(s.report().flag_counts.overlap, 2);
        assert_eq!(s.auto_fix_overlaps(), 1);
        assert!((s.word_timings()[0].end - 0.89).abs() < 1e-9);
        assert_eq!(s.word_timings()[1].end, 1.5);
        assert_eq!(s.report().flag_counts.overlap, 1);

        s.undo().unwrap();
        assert!(!s.can_undo());
        assert_eq!(s.auto_fix_overlaps(), 1);

        // A pass that fixes nothing records no history entry
        s.undo().unwrap();
        s.redo().unwrap();
        assert_eq!(s.auto_fix_overlaps(), 0);
        s.undo().unwrap();
        assert!(!s.can_undo());
    }

    #[test]
    fn test_accept_all_suggestions() {
        let mut s = session(
            "oh baby baby",
            &[("oh", 0.0, 0.5), ("babe", 0.5, 1.0), ("babe", 1.0, 1.5)],
        );
        assert_eq!(s.accept_all_suggestions(), 2);
        assert_eq!(words(&s), vec!["oh", "baby", "baby"]);
        assert_eq!(s.accept_all_suggestions(), 0);
        s.undo().unwrap();
        assert_eq!(words(&s), vec!["oh", "babe", "babe"]);
    }

    #[test]
    fn test_navigation_wraps() {
        let s = session(
            "a b c d",
            &[("a", 0.0, 0.5), ("b", 1.0, 5.0), ("c", 6.0, 6.5), ("d", 7.0, 7.01)],
        );
        assert_eq!(s.next_flagged(0.0), Some(1));
        assert_eq!(s.next_flagged(1.0), Some(3));
        assert_eq!(s.next_flagged(8.0), Some(1));
        assert_eq!(s.prev_flagged(7.05), Some(1));
        assert_eq!(s.prev_flagged(0.5), Some(3));

        let clean = session("a", &[("a", 0.0, 0.5)]);
        assert_eq!(clean.next_flagged(0.0), None);
        assert_eq!(clean.prev_flagged(0.0), None);
    }

    #[test]
    fn test_pitch_edits_and_review() {
        let mut s = session("a", &[("a", 0.0, 0.5)]);
        s.song.pitch_data = (0..5)
            .map(|i| PitchPoint {
                time: i as f64 / 10.0,
                midi_note: None,
                note_name: None,
                extra: Map::new(),
            })
            .collect();

        assert_eq!(s.set_pitch_for_range(0.1, 0.3, 62.0, "D4"), 3);
        assert_eq!(s.song().pitch_data[2].note_name.as_deref(), Some("D4"));
        assert_eq!(s.clear_pitch_for_range(0.25, 1.0), 2);
        assert_eq!(s.song().pitch_data[3].midi_note, None);
        assert_eq!(s.song().pitch_data[1].midi_note, Some(62.0));

        assert!(s.toggle_reviewed());
        let saved = s.to_song_data();
        assert_eq!(saved.reviewed, Some(true));
        assert_eq!(saved.word_timings[0].track, Some(0));
    }

    #[test]
    fn test_save_clears_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.json");
        let mut s = session("oh baby", &[("oh", 0.0, 0.5), ("babe", 0.5, 1.0)]);
        s.accept_suggestion(1).unwrap();
        s.save(&path).unwrap();
        assert!(!s.is_dirty());

        let reopened = EditorSession::open(&path, FlagConfig::default()).unwrap();
        assert!(reopened.report().is_clean());
        assert_eq!(reopened.word_timings()[1].word, "baby");
    }
}
