//! SQLite QC report written by the `scan` command.
//!
//! One row per song in `songs`, one row per flag in `word_flags`. Analyses
//! arrive from the flagging workers over a channel and are written by a
//! single thread in batched transactions.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use rusqlite::{params, Connection};

use crate::models::{FlagCounts, FlagKind};
use crate::queue::SongAnalysis;

const FLUSH_BATCH_SIZE: usize = 200;
const FLUSH_INTERVAL: Duration = Duration::from_millis(750);
const RECV_TIMEOUT: Duration = Duration::from_millis(200);

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA temp_store = MEMORY;

    CREATE TABLE songs (
        id INTEGER PRIMARY KEY,
        json_path TEXT NOT NULL UNIQUE,
        file_name TEXT NOT NULL,
        title TEXT NOT NULL,
        artist TEXT NOT NULL,
        duration REAL NOT NULL,
        reviewed INTEGER NOT NULL,
        word_count INTEGER NOT NULL,
        text_mismatch INTEGER NOT NULL,
        timing_long INTEGER NOT NULL,
        timing_short INTEGER NOT NULL,
        overlap INTEGER NOT NULL,
        extra_word INTEGER NOT NULL,
        missing_word INTEGER NOT NULL,
        total_flags INTEGER NOT NULL
    );

    CREATE TABLE word_flags (
        id INTEGER PRIMARY KEY,
        song_id INTEGER NOT NULL REFERENCES songs(id),
        timing_index INTEGER NOT NULL,
        word TEXT NOT NULL,
        start_time REAL,
        end_time REAL,
        type TEXT NOT NULL,
        message TEXT NOT NULL,
        suggested_word TEXT,
        similarity REAL
    );

    CREATE INDEX idx_word_flags_song ON word_flags(song_id);
    CREATE INDEX idx_word_flags_type ON word_flags(type);
";

/// Totals read back from a finished report.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub songs: usize,
    pub clean_songs: usize,
    pub counts: FlagCounts,
}

/// Create a fresh report database, replacing any existing file.
/// Callers must validate the path with `safety::validate_output_path` first.
pub fn create_report(path: &Path) -> Result<Connection> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove existing report {}", path.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to create report {}", path.display()))?;
    conn.execute_batch(SCHEMA)
        .context("Failed to create report schema")?;
    Ok(conn)
}

/// Write a batch of analyzed songs in one transaction. Returns flag rows written.
pub fn write_batch(conn: &mut Connection, songs: &[SongAnalysis]) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut flag_rows = 0;
    {
        let mut song_stmt = tx.prepare_cached(
            "INSERT INTO songs (json_path, file_name, title, artist, duration, reviewed, word_count,
                text_mismatch, timing_long, timing_short, overlap, extra_word, missing_word, total_flags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )?;
        let mut flag_stmt = tx.prepare_cached(
            "INSERT INTO word_flags (song_id, timing_index, word, start_time, end_time, type, message,
                suggested_word, similarity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;

        for song in songs {
            let counts = &song.report.flag_counts;
            let song_id = song_stmt.insert(params![
                song.entry.json_path.to_string_lossy().into_owned(),
                song.entry.file_name,
                song.entry.title,
                song.entry.artist,
                song.entry.duration,
                song.entry.reviewed,
                song.word_timings.len() as i64,
                counts.text_mismatch as i64,
                counts.timing_long as i64,
                counts.timing_short as i64,
                counts.overlap as i64,
                counts.extra_word as i64,
                counts.missing_word as i64,
                song.report.total_flags as i64,
            ])?;

            for (index, flags) in song.report.word_flags.iter().enumerate() {
                let Some(timing) = song.word_timings.get(index) else {
                    continue;
                };
                for flag in flags {
                    flag_stmt.execute(params![
                        song_id,
                        index as i64,
                        timing.word,
                        finite(timing.start),
                        finite(timing.end),
                        flag.kind.as_str(),
                        flag.message,
                        flag.suggested_word,
                        flag.similarity,
                    ])?;
                    flag_rows += 1;
                }
            }
        }
    }
    tx.commit()?;
    Ok(flag_rows)
}

/// Unusable times are stored as NULL.
fn finite(seconds: f64) -> Option<f64> {
    seconds.is_finite().then_some(seconds)
}

/// Drain analyses from the workers until the channel closes, flushing by
/// size or age. Returns the number of songs written.
pub fn writer_loop(conn: &mut Connection, rx: Receiver<SongAnalysis>) -> Result<usize> {
    let mut batch: Vec<SongAnalysis> = Vec::with_capacity(FLUSH_BATCH_SIZE);
    let mut last_flush = Instant::now();
    let mut written = 0;

    loop {
        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(song) => {
                batch.push(song);
                if batch.len() >= FLUSH_BATCH_SIZE || last_flush.elapsed() >= FLUSH_INTERVAL {
                    written += flush(conn, &mut batch)?;
                    last_flush = Instant::now();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !batch.is_empty() && last_flush.elapsed() >= FLUSH_INTERVAL {
                    written += flush(conn, &mut batch)?;
                    last_flush = Instant::now();
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                written += flush(conn, &mut batch)?;
                break;
            }
        }
    }
    Ok(written)
}

fn flush(conn: &mut Connection, batch: &mut Vec<SongAnalysis>) -> Result<usize> {
    if batch.is_empty() {
        return Ok(0);
    }
    write_batch(conn, batch)?;
    let n = batch.len();
    batch.clear();
    Ok(n)
}

/// Read song totals and per-type flag counts back from a report.
pub fn read_summary(conn: &Connection) -> Result<ReportSummary> {
    let (songs, clean_songs): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(total_flags = 0), 0) FROM songs",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let missing_word: i64 =
        conn.query_row("SELECT COALESCE(SUM(missing_word), 0) FROM songs", [], |row| row.get(0))?;

    let mut counts = FlagCounts {
        missing_word: missing_word as usize,
        ..FlagCounts::default()
    };
    let mut stmt = conn.prepare("SELECT type, COUNT(*) FROM word_flags GROUP BY type")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let kind: String = row.get(0)?;
        let n: i64 = row.get(1)?;
        if let Some(kind) = FlagKind::ALL.into_iter().find(|k| k.as_str() == kind) {
            for _ in 0..n {
                counts.record(kind);
            }
        }
    }

    Ok(ReportSummary {
        songs: songs as usize,
        clean_songs: clean_songs as usize,
        counts,
    })
}
