//! Song file model and JSON I/O.
//!
//! Song files are produced by an external transcription pipeline and edited
//! by hand, so several fields arrive loosely typed. Title and artist may be a
//! string, a number, a list or a localized object; `display_string` turns any
//! of them into one line of text with a fixed fallback order.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{QcError, Result};
use crate::models::WordTiming;

pub const UNTITLED: &str = "Untitled";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Object keys tried, in order, when a display field is a JSON object.
const DISPLAY_KEYS: [&str; 3] = ["en", "default", "name"];

// ============================================================================
// Loose Fields
// ============================================================================

/// A display field whose JSON type is not fixed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseField {
    Text(String),
    Number(serde_json::Number),
    List(Vec<Value>),
    Object(Map<String, Value>),
    Other(Value),
}

impl LooseField {
    /// Best-effort single-line rendering; `None` when nothing usable is inside.
    ///
    /// Order: string as-is, number formatted, list items joined with ", ",
    /// object via its `en`/`default`/`name` key, else the object as JSON.
    pub fn display(&self) -> Option<String> {
        match self {
            LooseField::Text(s) => Some(s.clone()),
            LooseField::Number(n) => Some(n.to_string()),
            LooseField::List(items) => Some(join_items(items)),
            LooseField::Object(map) => Some(object_display(map)),
            LooseField::Other(value) => value_display(value),
        }
    }
}

/// Render an optional loose field, falling back when it is absent or null.
pub fn display_string(field: Option<&LooseField>, fallback: &str) -> String {
    field
        .and_then(LooseField::display)
        .unwrap_or_else(|| fallback.to_string())
}

fn value_display(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(join_items(items)),
        Value::Object(map) => Some(object_display(map)),
    }
}

fn join_items(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(value_display)
        .collect::<Vec<_>>()
        .join(", ")
}

fn object_display(map: &Map<String, Value>) -> String {
    DISPLAY_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .find(|value| is_truthy(value))
        .and_then(value_display)
        .unwrap_or_else(|| Value::Object(map.clone()).to_string())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ============================================================================
// Song Model
// ============================================================================

/// One pitch-contour sample. Unknown fields pass through.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PitchPoint {
    pub time: f64,
    #[serde(default)]
    pub midi_note: Option<f64>,
    #[serde(default)]
    pub note_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A song file: lyrics, word timings and pitch data for one audio file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SongData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<LooseField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<LooseField>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub word_timings: Vec<WordTiming>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub pitch_data: Vec<PitchPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SongData {
    pub fn title_text(&self) -> String {
        display_string(self.title.as_ref(), UNTITLED)
    }

    pub fn artist_text(&self) -> String {
        display_string(self.artist.as_ref(), UNKNOWN_ARTIST)
    }

    /// Replace loose title/artist values with their display strings.
    pub fn sanitize(&mut self, title_fallback: &str) {
        self.title = Some(LooseField::Text(display_string(self.title.as_ref(), title_fallback)));
        self.artist = Some(LooseField::Text(self.artist_text()));
    }
}

/// Numbers pass through, numeric strings are parsed, anything else is 0.
fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    })
}

/// Arrays are parsed element by element; a non-array (or null) becomes empty.
fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(serde::de::Error::custom))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

// ============================================================================
// File I/O
// ============================================================================

/// Load a song file and sanitize its display fields.
/// The title falls back to the file stem, then to "Untitled".
pub fn load_song(path: &Path) -> Result<SongData> {
    let content = fs::read_to_string(path).map_err(|e| QcError::io("reading song", path, e))?;
    let mut song: SongData =
        serde_json::from_str(&content).map_err(|e| QcError::json("parsing song", path, e))?;

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(UNTITLED);
    song.sanitize(stem);
    Ok(song)
}

/// Write a song file as pretty-printed JSON.
pub fn save_song(path: &Path, song: &SongData) -> Result<()> {
    let json =
        serde_json::to_string_pretty(song).map_err(|e| QcError::json("serializing song", path, e))?;
    fs::write(path, json).map_err(|e| QcError::io("writing song", path, e))
}

// ============================================================================
// TESTS
// ============================================================================
