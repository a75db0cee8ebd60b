//! Extraction tool backend: `yt-dlp` finds the first search hit, extracts the
//! audio and converts it. Output goes to a private scratch directory that is
//! removed when the attempt ends, whatever the outcome.

use std::{fs, io, path::PathBuf};

use tempfile::TempDir;

use super::{AudioPayload, AudioSource, SourceError, Tool};

const OUTPUT_STEM: &str = "track";

pub struct ExtractToolSource {
    ytdlp: Tool,
    audio_format: String,
    /// parent of the scratch directories, the system temp dir if unset
    temp_root: Option<PathBuf>,
}

impl ExtractToolSource {
    pub fn new(ytdlp: Tool, audio_format: impl Into<String>) -> Self {
        Self {
            ytdlp,
            audio_format: audio_format.into(),
            temp_root: None,
        }
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// unique per attempt, so identical queries never share a path
    fn scratch_dir(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("playlist-dl-");
        match &self.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }
}

impl AudioSource for ExtractToolSource {
    fn name(&self) -> &'static str {
        "extract-tool"
    }

    fn fetch(&self, query: &str) -> Result<AudioPayload, SourceError> {
        let scratch = self.scratch_dir()?;
        let template = scratch.path().join(format!("{OUTPUT_STEM}.%(ext)s"));

        let output = self
            .ytdlp
            .command()
            .arg(format!("ytsearch1:{query}"))
            .args([
                "--no-playlist",
                "--extract-audio",
                "--audio-format",
                self.audio_format.as_str(),
                "--output",
            ])
            .arg(&template)
            .output()?;

        if !output.status.success() {
            return Err(self.ytdlp.failure(&output.stderr));
        }

        let produced = scratch
            .path()
            .join(format!("{OUTPUT_STEM}.{}", self.audio_format));
        match fs::read(&produced) {
            Ok(bytes) => Ok(AudioPayload::from(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SourceError::NoMatch(query.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
