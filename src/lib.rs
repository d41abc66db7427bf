//! Karaoke lyric QC library - alignment, flagging and editing shared by all binaries.

pub mod align;
pub mod editor;
pub mod error;
pub mod flags;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod queue;
pub mod report_db;
pub mod safety;
pub mod song;

pub use align::{align_lyrics_to_timings, AlignConfig};
pub use error::{QcError, Result};
pub use flags::{generate_flags, generate_flags_with, FlagConfig};
pub use models::{AlignmentEdge, Flag, FlagCounts, FlagKind, FlagReport, WordTiming};
