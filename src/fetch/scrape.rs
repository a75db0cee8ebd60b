//! Scrape + transcode backend.
//!
//! Finds a video id on the platform's search results page, resolves a direct
//! audio stream for it, downloads the stream and transcodes it to mp3 with
//! ffmpeg.

use std::{io::Write, sync::LazyLock};

use log::debug;
use regex::Regex;
use reqwest::blocking::Client;

use super::{AudioPayload, AudioSource, SourceError, Tool, check_status};

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"videoId":"([^"]+)""#).expect("video id pattern is valid"));

pub struct ScrapeSource {
    http_client: Client,
    /// e.g. `https://www.youtube.com`
    site_url: String,
    /// appended to every search, `lyrics` steers results away from music videos
    query_suffix: Option<String>,
    ytdlp: Tool,
    ffmpeg: Tool,
}

impl ScrapeSource {
    pub fn new(
        http_client: Client,
        site_url: impl Into<String>,
        query_suffix: Option<String>,
        ytdlp: Tool,
        ffmpeg: Tool,
    ) -> Self {
        Self {
            http_client,
            site_url: site_url.into(),
            query_suffix,
            ytdlp,
            ffmpeg,
        }
    }

    fn site(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }

    fn search_terms(&self, query: &str) -> String {
        match self.query_suffix.as_deref() {
            Some(suffix) if !suffix.is_empty() => format!("{query} {suffix}"),
            _ => query.to_string(),
        }
    }

    fn watch_url(&self, video_id: &str) -> String {
        format!("{}/watch?v={video_id}", self.site())
    }

    fn search(&self, query: &str) -> Result<String, SourceError> {
        let response = self
            .http_client
            .get(format!("{}/results", self.site()))
            .query(&[("search_query", self.search_terms(query))])
            .send()?;
        check_status(response.status())?;

        let html = response.text()?;
        extract_video_id(&html)
            .map(str::to_string)
            .ok_or_else(|| SourceError::NoMatch(query.to_string()))
    }

    /// direct URL of the best audio-only stream
    fn resolve_stream(&self, video_id: &str) -> Result<String, SourceError> {
        let output = self
            .ytdlp
            .command()
            .args(["--get-url", "--format", "bestaudio", "--no-playlist"])
            .arg(self.watch_url(video_id))
            .output()?;

        if !output.status.success() {
            return Err(self.ytdlp.failure(&output.stderr));
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SourceError::NoMatch(video_id.to_string()))
    }

    fn download_stream(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let response = self.http_client.get(url).send()?;
        check_status(response.status())?;
        Ok(response.bytes()?.to_vec())
    }

    fn transcode(&self, input: &[u8]) -> Result<Vec<u8>, SourceError> {
        transcode_to_mp3(&self.ffmpeg, input)
    }
}

impl AudioSource for ScrapeSource {
    fn name(&self) -> &'static str {
        "scrape"
    }

    fn fetch(&self, query: &str) -> Result<AudioPayload, SourceError> {
        let video_id = self.search(query)?;
        debug!("'{query}' matched video {video_id}");

        let stream_url = self.resolve_stream(&video_id)?;
        let stream = self.download_stream(&stream_url)?;
        let mp3 = self.transcode(&stream)?;

        Ok(AudioPayload::from(mp3))
    }
}

/// First embedded video id in a search results page
pub fn extract_video_id(html: &str) -> Option<&str> {
    VIDEO_ID
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Runs ffmpeg over `input`, returning mp3 bytes from its stdout.
///
/// The input goes through a temporary file that is deleted on drop.
fn transcode_to_mp3(ffmpeg: &Tool, input: &[u8]) -> Result<Vec<u8>, SourceError> {
    let mut source_file = tempfile::Builder::new()
        .prefix("playlist-dl-stream-")
        .tempfile()?;
    source_file.write_all(input)?;
    source_file.flush()?;

    let output = ffmpeg
        .command()
        .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(source_file.path())
        .args(["-vn", "-codec:a", "libmp3lame", "-q:a", "0", "-f", "mp3", "pipe:1"])
        .output()?;

    if !output.status.success() {
        return Err(ffmpeg.failure(&output.stderr));
    }
    if output.stdout.is_empty() {
        return Err(SourceError::Tool {
            tool: ffmpeg.name(),
            message: "produced no audio".into(),
        });
    }
    Ok(output.stdout)
}
