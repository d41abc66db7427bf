//! Print the lyric-to-timing alignment of one song as a table
//! Usage: cargo run --release --bin align-trace -- <song.json>
//!        cargo run --release --bin align-trace -- --lyrics "oh baby" --words "oh babe"

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use karaoke_qc::align::{align_with, AlignConfig};
use karaoke_qc::models::{AlignmentEdge, WordTiming};
use karaoke_qc::song::load_song;

/// Spacing used for synthetic timings built from `--words`
const SYNTHETIC_WORD_SECONDS: f64 = 0.5;

#[derive(Parser)]
#[command(name = "align-trace")]
#[command(about = "Show how lyric tokens line up with transcribed word timings")]
struct Args {
    /// Song JSON file (lyrics_text + word_timings)
    song: Option<PathBuf>,

    /// Lyrics text to align instead of a song file
    #[arg(long, requires = "words", conflicts_with = "song")]
    lyrics: Option<String>,

    /// Space-separated transcribed words, timed 0.5s apart
    #[arg(long, requires = "lyrics")]
    words: Option<String>,

    /// Only print rows that are not exact matches
    #[arg(long)]
    problems: bool,
}

fn synthetic_timings(words: &str) -> Vec<WordTiming> {
    words
        .split_whitespace()
        .enumerate()
        .map(|(i, w)| {
            let start = i as f64 * SYNTHETIC_WORD_SECONDS;
            WordTiming::new(w, start, start + SYNTHETIC_WORD_SECONDS)
        })
        .collect()
}

fn print_row(edge: &AlignmentEdge, timings: &[WordTiming]) {
    let lyric = match (edge.lyric_index(), edge.lyric_word()) {
        (Some(i), Some(w)) => format!("{:>4} {}", i, w),
        _ => "   -".to_string(),
    };
    let timing = match edge.timing_index().and_then(|i| timings.get(i).map(|t| (i, t))) {
        Some((i, t)) => format!("{:>4} {} @{:.2}", i, t.word, t.start),
        None => "   -".to_string(),
    };
    let sim = edge
        .similarity()
        .map(|s| format!("{:.3}", s))
        .unwrap_or_default();
    println!("{:<15} {:<28} {:<28} {:>6}", edge.kind(), lyric, timing, sim);
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (lyrics, timings) = match (&args.song, &args.lyrics, &args.words) {
        (Some(path), _, _) => {
            let song = load_song(path)?;
            println!("{} - {}", song.title_text(), song.artist_text());
            (song.lyrics_text.unwrap_or_default(), song.word_timings)
        }
        (None, Some(lyrics), Some(words)) => (lyrics.clone(), synthetic_timings(words)),
        _ => bail!("pass a song file or both --lyrics and --words"),
    };

    let edges = align_with(&AlignConfig::default(), &lyrics, &timings);
    if edges.is_empty() {
        println!("Nothing to align (empty lyrics or no word timings)");
        return Ok(());
    }

    println!("{:<15} {:<28} {:<28} {:>6}", "EDGE", "LYRIC", "TIMING", "SIM");
    println!("{:-<80}", "");
    for edge in &edges {
        if args.problems && matches!(edge, AlignmentEdge::Match { .. }) {
            continue;
        }
        print_row(edge, &timings);
    }
    println!("{:-<80}", "");

    let count = |kind: &str| edges.iter().filter(|e| e.kind() == kind).count();
    println!(
        "match={} mismatch={} missing_timing={} extra_timing={}",
        count("match"),
        count("mismatch"),
        count("missing_timing"),
        count("extra_timing")
    );
    Ok(())
}
