use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::bounded;
use std::path::{Path, PathBuf};
use std::time::Instant;

use karaoke_qc::editor::EditorSession;
use karaoke_qc::flags::{FlagConfig, LONG_WORD_SECONDS, OVERLAP_TOLERANCE_SECONDS, SHORT_WORD_SECONDS};
use karaoke_qc::align::{AlignConfig, MATCH_THRESHOLD, SCORE_THRESHOLD};
use karaoke_qc::models::FlagReport;
use karaoke_qc::progress::{create_spinner, format_duration, set_log_only};
use karaoke_qc::queue::{
    analyze_queue_with, filter_queue, has_unknown_artist, queue_stats, scan_folder, QueueFilterMode,
    SongAnalysis,
};
use karaoke_qc::report_db::{create_report, read_summary, writer_loop};
use karaoke_qc::safety::{validate_output_path, validate_song_output};
use karaoke_qc::song::load_song;
use karaoke_qc::{generate_flags_with, WordTiming};

#[derive(Parser)]
#[command(name = "karaoke-qc")]
#[command(about = "Check karaoke word timings against lyrics and fix common problems")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Flag one song and print the problems found
    Check {
        song: PathBuf,

        /// Print the full flag report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        thresholds: Thresholds,
    },

    /// Flag every song in a folder
    Scan {
        folder: PathBuf,

        /// Write a SQLite report (file name must contain "report")
        #[arg(long)]
        report: Option<PathBuf>,

        /// Only list songs whose title, artist or file name contain this text
        #[arg(long)]
        filter: Option<String>,

        /// all, reviewed, unreviewed, flagged or clean
        #[arg(long, default_value = "all")]
        mode: QueueFilterMode,

        #[arg(long, default_value = "0")]
        workers: usize,

        /// Hide progress bars and print tail-friendly progress lines
        #[arg(long)]
        log_only: bool,

        #[command(flatten)]
        thresholds: Thresholds,
    },

    /// Shorten overlapping words so they end just before the next word
    FixOverlaps {
        song: PathBuf,

        /// Write the fixed song here instead of in place
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        thresholds: Thresholds,
    },

    /// Replace every mismatched word with its lyric suggestion
    AcceptSuggestions {
        song: PathBuf,

        /// Write the fixed song here instead of in place
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        thresholds: Thresholds,
    },
}

#[derive(Args, Clone, Copy)]
struct Thresholds {
    /// Words longer than this (seconds) are flagged
    #[arg(long, default_value_t = LONG_WORD_SECONDS)]
    long_seconds: f64,

    /// Words shorter than this (seconds) are flagged
    #[arg(long, default_value_t = SHORT_WORD_SECONDS)]
    short_seconds: f64,

    /// Overlap allowed before a word is flagged (seconds)
    #[arg(long, default_value_t = OVERLAP_TOLERANCE_SECONDS)]
    overlap_tolerance: f64,

    /// Minimum similarity for a lyric/word pair to count as a match
    #[arg(long, default_value_t = MATCH_THRESHOLD)]
    match_threshold: f64,

    /// Minimum similarity for a pair to score as a substitution
    #[arg(long, default_value_t = SCORE_THRESHOLD)]
    score_threshold: f64,
}

impl Thresholds {
    fn to_config(self) -> Result<FlagConfig> {
        if self.short_seconds >= self.long_seconds {
            bail!(
                "--short-seconds ({}) must be below --long-seconds ({})",
                self.short_seconds,
                self.long_seconds
            );
        }
        if !(0.0..=1.0).contains(&self.match_threshold) || !(0.0..=1.0).contains(&self.score_threshold) {
            bail!("similarity thresholds must be between 0 and 1");
        }
        Ok(FlagConfig {
            long_seconds: self.long_seconds,
            short_seconds: self.short_seconds,
            overlap_tolerance: self.overlap_tolerance,
            align: AlignConfig {
                match_threshold: self.match_threshold,
                score_threshold: self.score_threshold,
                ..AlignConfig::default()
            },
        })
    }
}

const REPORT_QUEUE_SIZE: usize = 256;

// ============================================================================
// check
// ============================================================================

fn print_word_flags(words: &[WordTiming], report: &FlagReport) {
    for index in report.flagged_indices() {
        let Some(word) = words.get(index) else {
            continue;
        };
        for flag in &report.word_flags[index] {
            println!(
                "  #{:<5} {:<20} {:>8.2}-{:<8.2} {:<14} {}",
                index,
                format!("\"{}\"", word.word),
                word.start,
                word.end,
                flag.kind.as_str(),
                flag.message
            );
        }
    }
}

fn print_counts(report: &FlagReport) {
    let c = &report.flag_counts;
    println!(
        "  mismatch={} long={} short={} overlap={} extra={} missing={} total={}",
        c.text_mismatch,
        c.timing_long,
        c.timing_short,
        c.overlap,
        c.extra_word,
        c.missing_word,
        report.total_flags
    );
}

fn run_check(song_path: &Path, json: bool, config: FlagConfig) -> Result<()> {
    let song = load_song(song_path)?;
    let report = generate_flags_with(&config, song.lyrics_text.as_deref(), &song.word_timings);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} - {}", song.title_text(), song.artist_text());
    println!("{:-<80}", "");
    if report.is_clean() {
        println!("  Clean ({} words)", song.word_timings.len());
    } else {
        print_word_flags(&song.word_timings, &report);
    }
    println!("{:-<80}", "");
    print_counts(&report);
    Ok(())
}

// ============================================================================
// scan
// ============================================================================

fn print_song_line(song: &SongAnalysis) {
    let artist = if has_unknown_artist(&song.entry) {
        "?".to_string()
    } else {
        song.entry.artist.clone()
    };
    println!(
        "{} {:<32} {} - {} [{}]",
        if song.entry.reviewed { "✓" } else { " " },
        song.entry.file_name,
        song.entry.title,
        artist,
        song.report.flag_counts.badges().join(", ")
    );
}

fn run_scan(
    folder: &Path,
    report_path: Option<&Path>,
    filter: Option<&str>,
    mode: QueueFilterMode,
    config: FlagConfig,
) -> Result<()> {
    let start = Instant::now();

    let spinner = create_spinner("Phase 1: Scanning folder");
    let entries = scan_folder(folder)?;
    spinner.finish_with_message(format!("Phase 1: Found {} songs", entries.len()));
    eprintln!("[SCAN] {} songs with audio under {}", entries.len(), folder.display());

    if let Some(path) = report_path {
        let sources: Vec<&Path> = entries.iter().map(|e| e.json_path.as_path()).collect();
        validate_output_path(path, "report", &sources)?;
    }

    let (results, written) = match report_path {
        Some(path) => {
            let mut conn = create_report(path)?;
            let (tx, rx) = bounded::<SongAnalysis>(REPORT_QUEUE_SIZE);
            let writer = std::thread::spawn(move || -> Result<(usize, rusqlite::Connection)> {
                let written = writer_loop(&mut conn, rx)?;
                Ok((written, conn))
            });

            let results = analyze_queue_with(&entries, &config, |song| {
                if tx.send(song.clone()).is_err() {
                    eprintln!("[REPORT] Writer stopped, {} not recorded", song.entry.file_name);
                }
            });
            drop(tx);

            let (written, conn) = writer
                .join()
                .map_err(|_| anyhow::anyhow!("report writer thread panicked"))??;
            let summary = read_summary(&conn)?;
            eprintln!(
                "[REPORT] {} songs, {} clean, {} flags -> {}",
                summary.songs,
                summary.clean_songs,
                summary.counts.total(),
                path.display()
            );
            (results, Some(written))
        }
        None => (analyze_queue_with(&entries, &config, |_| {}), None),
    };

    let mut songs = Vec::with_capacity(results.len());
    for (entry, result) in results {
        match result {
            Ok(song) => songs.push(song),
            Err(e) => eprintln!("[FLAG] Failed {}: {}", entry.file_name, e),
        }
    }

    let shown = filter_queue(&songs, filter.unwrap_or(""), mode);
    println!("{:-<80}", "");
    for song in &shown {
        print_song_line(song);
    }
    println!("{:-<80}", "");

    let stats = queue_stats(&songs);
    println!("\n{:=<60}", "");
    println!("Scan complete!");
    println!("  Songs: {} ({} shown, mode={})", stats.songs, shown.len(), mode);
    println!("  Clean: {}", stats.clean_songs);
    println!("  Reviewed: {}", stats.reviewed_songs);
    println!("  Total flags: {}", stats.total_flags);
    if let Some(written) = written {
        println!("  Report rows: {} songs", written);
    }
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");
    Ok(())
}

// ============================================================================
// fix-overlaps / accept-suggestions
// ============================================================================

fn save_session(session: &mut EditorSession, source: &Path, output: Option<&Path>) -> Result<PathBuf> {
    let target = output.unwrap_or(source);
    validate_song_output(target, source)?;
    session
        .save(target)
        .with_context(|| format!("Failed to save {}", target.display()))?;
    Ok(target.to_path_buf())
}

fn run_fix_overlaps(song_path: &Path, output: Option<&Path>, config: FlagConfig) -> Result<()> {
    let mut session = EditorSession::open(song_path, config)?;
    let before = session.report().flag_counts.overlap;
    let fixed = session.auto_fix_overlaps();
    eprintln!(
        "[FIX] {} of {} overlapping words fixed ({} remain)",
        fixed,
        before,
        session.report().flag_counts.overlap
    );

    if fixed == 0 {
        println!("Nothing to fix in {}", song_path.display());
        return Ok(());
    }
    let saved = save_session(&mut session, song_path, output)?;
    println!("Saved {}", saved.display());
    Ok(())
}

fn run_accept_suggestions(song_path: &Path, output: Option<&Path>, config: FlagConfig) -> Result<()> {
    let mut session = EditorSession::open(song_path, config)?;
    let before = session.report().flag_counts.text_mismatch;
    let replaced = session.accept_all_suggestions();
    eprintln!(
        "[FIX] {} of {} mismatched words replaced ({} flags remain)",
        replaced,
        before,
        session.report().total_flags
    );

    if replaced == 0 {
        println!("No suggestions to accept in {}", song_path.display());
        return Ok(());
    }
    let saved = save_session(&mut session, song_path, output)?;
    println!("Saved {}", saved.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Check { song, json, thresholds } => run_check(&song, json, thresholds.to_config()?),
        Command::Scan {
            folder,
            report,
            filter,
            mode,
            workers,
            log_only,
            thresholds,
        } => {
            set_log_only(log_only);
            if workers > 0 {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build_global()
                    .context("Failed to set thread pool size")?;
            }
            run_scan(&folder, report.as_deref(), filter.as_deref(), mode, thresholds.to_config()?)
        }
        Command::FixOverlaps { song, output, thresholds } => {
            run_fix_overlaps(&song, output.as_deref(), thresholds.to_config()?)
        }
        Command::AcceptSuggestions { song, output, thresholds } => {
            run_accept_suggestions(&song, output.as_deref(), thresholds.to_config()?)
        }
    }
}
