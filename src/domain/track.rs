use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const AUDIO_EXTENSION: &str = "mp3";

/// Runs of characters that cannot appear in an archive entry name
static FORBIDDEN_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]+"#).expect("forbidden char pattern is valid"));

/// Identifies a track to locate: what the playlist says, nothing more.
///
/// Two equal descriptors are still two independent tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub name: String,
    pub artist: String,
}

impl TrackDescriptor {
    pub fn new(name: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artist: artist.into(),
        }
    }

    /// search query sent to the audio source
    pub fn build_query(&self) -> String {
        format!("{} {}", self.name, self.artist)
    }

    /// `"{name} - {artist}.mp3"`, safe to use as a single path component
    pub fn build_filename(&self) -> String {
        sanitize_component(&format!(
            "{} - {}.{AUDIO_EXTENSION}",
            self.name, self.artist
        ))
    }
}

/// Replaces every run of path-breaking characters with a single `_`.
pub fn sanitize_component(s: &str) -> String {
    FORBIDDEN_RUN.replace_all(s, "_").into_owned()
}

/// Name for a single-track upload derived from a free-form query.
pub fn filename_for_query(query: &str) -> String {
    sanitize_component(&format!("{}.{AUDIO_EXTENSION}", query.trim()))
}
