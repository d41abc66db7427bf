//! Safety checks run before a binary writes or replaces a file.
//!
//! Report databases are deleted and recreated on every scan, so their path
//! must never point at a song file or its audio.

use anyhow::{bail, Result};
use std::path::Path;

/// Extensions that belong to scanned songs and must never be overwritten by a report.
const SONG_FILE_EXTENSIONS: [&str; 2] = ["json", "mp3"];

/// Validates that a report output path is safe to overwrite.
///
/// Checks:
/// - Output filename must contain the required pattern (e.g., "report")
/// - Output cannot be the same as any of the provided source paths
/// - Output cannot carry a song file extension
pub fn validate_output_path(
    output: &Path,
    required_pattern: &str,
    source_paths: &[&Path],
) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(required_pattern) {
        bail!(
            "Safety check failed: output file '{}' must contain '{}' in the name",
            output.display(),
            required_pattern
        );
    }

    for source in source_paths {
        if output == *source {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    if let Some(ext) = song_extension(output) {
        bail!(
            "Safety check failed: output '{}' has song file extension '.{}'",
            output.display(),
            ext
        );
    }

    Ok(())
}

/// Validates the destination of an edited song file.
///
/// The file must be JSON, and must not be the audio of the song being edited.
pub fn validate_song_output(output: &Path, source: &Path) -> Result<()> {
    if output == source.with_extension("mp3") {
        bail!(
            "Safety check failed: output '{}' is the audio file of '{}'",
            output.display(),
            source.display()
        );
    }
    if output.extension().and_then(|e| e.to_str()) != Some("json") {
        bail!(
            "Safety check failed: edited song '{}' must be written to a .json file",
            output.display()
        );
    }
    Ok(())
}

fn song_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    SONG_FILE_EXTENSIONS.into_iter().find(|e| *e == ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_report_output() {
        let output = PathBuf::from("/tmp/qc-report.sqlite3");
        let source = PathBuf::from("/songs/track.json");
        assert!(validate_output_path(&output, "report", &[&source]).is_ok());
    }

    #[test]
    fn test_missing_pattern() {
        let output = PathBuf::from("/tmp/output.sqlite3");
        let source = PathBuf::from("/songs/track.json");
        let result = validate_output_path(&output, "report", &[&source]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must contain 'report'"));
    }

    #[test]
    fn test_output_equals_source() {
        let path = PathBuf::from("/songs/report.sqlite3");
        let result = validate_output_path(&path, "report", &[&path]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be the same as source"));
    }

    #[test]
    fn test_song_extension_blocked() {
        let source = PathBuf::from("/songs/other.json");
        let json = PathBuf::from("/songs/report.json");
        let mp3 = PathBuf::from("/songs/report.MP3");
        assert!(validate_output_path(&json, "report", &[&source]).is_err());
        assert!(validate_output_path(&mp3, "report", &[&source]).is_err());
    }

    #[test]
    fn test_song_output_checks() {
        let source = PathBuf::from("/songs/track.json");
        assert!(validate_song_output(&source, &source).is_ok());
        assert!(validate_song_output(Path::new("/songs/track-fixed.json"), &source).is_ok());
        let audio = validate_song_output(Path::new("/songs/track.mp3"), &source).unwrap_err();
        assert!(audio.to_string().contains("is the audio file of"));
        let other_audio = validate_song_output(Path::new("/songs/other.mp3"), &source).unwrap_err();
        assert!(other_audio.to_string().contains("must be written to a .json file"));
        assert!(validate_song_output(Path::new("/songs/track.txt"), &source).is_err());
    }
}
