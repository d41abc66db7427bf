//! Song queue: folder scanning, batch analysis and filtering.
//!
//! A song is a `<name>.json` timing file with a sibling `<name>.mp3`. The
//! queue is the sorted list of such pairs under a root folder.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{QcError, Result};
use crate::flags::{generate_flags_with, FlagConfig};
use crate::models::{FlagReport, WordTiming};
use crate::normalize::fold_to_ascii;
use crate::progress::{create_progress_bar, log_progress};
use crate::song::{load_song, UNKNOWN_ARTIST};

const AUDIO_EXTENSION: &str = "mp3";
const SONG_EXTENSION: &str = "json";

// ============================================================================
// Models
// ============================================================================

/// One song found on disk.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueueEntry {
    pub json_path: PathBuf,
    pub mp3_path: PathBuf,
    pub file_name: String,
    pub title: String,
    pub artist: String,
    pub duration: f64,
    pub reviewed: bool,
}

/// Flag pass result for one queued song.
#[derive(Clone, Debug)]
pub struct SongAnalysis {
    pub entry: QueueEntry,
    pub word_timings: Vec<WordTiming>,
    pub report: FlagReport,
}

/// Queue view modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueueFilterMode {
    #[default]
    All,
    Reviewed,
    Unreviewed,
    Flagged,
    Clean,
}

impl QueueFilterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueFilterMode::All => "all",
            QueueFilterMode::Reviewed => "reviewed",
            QueueFilterMode::Unreviewed => "unreviewed",
            QueueFilterMode::Flagged => "flagged",
            QueueFilterMode::Clean => "clean",
        }
    }

    fn accepts(self, song: &SongAnalysis) -> bool {
        match self {
            QueueFilterMode::All => true,
            QueueFilterMode::Reviewed => song.entry.reviewed,
            QueueFilterMode::Unreviewed => !song.entry.reviewed,
            QueueFilterMode::Flagged => !song.report.is_clean(),
            QueueFilterMode::Clean => song.report.is_clean(),
        }
    }
}

impl FromStr for QueueFilterMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(QueueFilterMode::All),
            "reviewed" => Ok(QueueFilterMode::Reviewed),
            "unreviewed" => Ok(QueueFilterMode::Unreviewed),
            "flagged" => Ok(QueueFilterMode::Flagged),
            "clean" => Ok(QueueFilterMode::Clean),
            other => Err(format!(
                "unknown queue mode '{}' (expected all, reviewed, unreviewed, flagged or clean)",
                other
            )),
        }
    }
}

impl fmt::Display for QueueFilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Totals shown above the queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub songs: usize,
    pub total_flags: usize,
    pub clean_songs: usize,
    pub reviewed_songs: usize,
}

// ============================================================================
// Scanning
// ============================================================================

/// Recursively collect songs under `root`, sorted by file name.
/// Unreadable song files are logged and skipped.
pub fn scan_folder(root: &Path) -> Result<Vec<QueueEntry>> {
    fs::read_dir(root).map_err(|e| QcError::io("scanning folder", root, e))?;

    let mut entries = Vec::new();
    for dir_entry in WalkDir::new(root).follow_links(true) {
        let dir_entry = match dir_entry {
            Ok(e) => e,
            Err(e) => {
                eprintln!("[SCAN] Skipping unreadable path: {}", e);
                continue;
            }
        };
        let path = dir_entry.path();
        if !dir_entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(SONG_EXTENSION)
        {
            continue;
        }
        let mp3_path = path.with_extension(AUDIO_EXTENSION);
        if !mp3_path.is_file() {
            continue;
        }

        match load_song(path) {
            Ok(song) => {
                let file_name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                entries.push(QueueEntry {
                    json_path: path.to_path_buf(),
                    mp3_path,
                    title: song.title_text(),
                    artist: song.artist_text(),
                    duration: song.duration,
                    reviewed: song.reviewed.unwrap_or(false),
                    file_name,
                });
            }
            Err(e) => eprintln!("[SCAN] Skipping {}", e),
        }
    }

    entries.sort_by(|a, b| {
        a.file_name
            .to_lowercase()
            .cmp(&b.file_name.to_lowercase())
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
    Ok(entries)
}

// ============================================================================
// Analysis
// ============================================================================

/// Load one queued song and run a full flag pass on it.
///
/// The file is read again rather than reusing the scan's parse: entries only
/// hold display fields, so a queue over a large library never keeps every
/// song's timings in memory, and edits saved after the scan are picked up.
pub fn analyze_song(entry: &QueueEntry, config: &FlagConfig) -> Result<SongAnalysis> {
    let song = load_song(&entry.json_path)?;
    let report = generate_flags_with(config, song.lyrics_text.as_deref(), &song.word_timings);
    Ok(SongAnalysis {
        entry: entry.clone(),
        word_timings: song.word_timings,
        report,
    })
}

/// Analyze every song in parallel. Results keep queue order; songs that fail
/// to load are returned as errors alongside their entry.
pub fn analyze_queue(
    entries: &[QueueEntry],
    config: &FlagConfig,
) -> Vec<(QueueEntry, Result<SongAnalysis>)> {
    analyze_queue_with(entries, config, |_| {})
}

/// Like `analyze_queue`, calling `on_analyzed` from the worker thread as
/// each song finishes (used to stream results to the report writer).
pub fn analyze_queue_with<F>(
    entries: &[QueueEntry],
    config: &FlagConfig,
    on_analyzed: F,
) -> Vec<(QueueEntry, Result<SongAnalysis>)>
where
    F: Fn(&SongAnalysis) + Sync,
{
    let total = entries.len() as u64;
    let pb = create_progress_bar(total, "Flagging songs");
    let done = AtomicU64::new(0);

    let results = entries
        .par_iter()
        .map(|entry| {
            let result = analyze_song(entry, config);
            if let Ok(analysis) = &result {
                on_analyzed(analysis);
            }
            pb.inc(1);
            let current = done.fetch_add(1, Ordering::Relaxed) + 1;
            log_progress("FLAG", current, total, 100);
            (entry.clone(), result)
        })
        .collect();

    pb.finish_with_message("Flagging complete");
    results
}

// ============================================================================
// Filtering
// ============================================================================

/// Filter analyzed songs by a free-text query and a view mode.
///
/// The query matches title, artist or file name case-insensitively, with
/// diacritics folded ("beyonce" finds "Beyoncé").
pub fn filter_queue<'a>(
    songs: &'a [SongAnalysis],
    query: &str,
    mode: QueueFilterMode,
) -> Vec<&'a SongAnalysis> {
    let needle = fold_to_ascii(query.trim());
    songs
        .iter()
        .filter(|song| needle.is_empty() || matches_query(&song.entry, &needle))
        .filter(|song| mode.accepts(song))
        .collect()
}

fn matches_query(entry: &QueueEntry, needle: &str) -> bool {
    [&entry.title, &entry.artist, &entry.file_name]
        .iter()
        .any(|field| fold_to_ascii(field).contains(needle))
}

pub fn queue_stats(songs: &[SongAnalysis]) -> QueueStats {
    QueueStats {
        songs: songs.len(),
        total_flags: songs.iter().map(|s| s.report.total_flags).sum(),
        clean_songs: songs.iter().filter(|s| s.report.is_clean()).count(),
        reviewed_songs: songs.iter().filter(|s| s.entry.reviewed).count(),
    }
}

/// True when the entry's artist is the placeholder used for missing artists.
pub fn has_unknown_artist(entry: &QueueEntry) -> bool {
    entry.artist == UNKNOWN_ARTIST
}

// ============================================================================
// TESTS
// ============================================================================
