//! Reading a playlist's tracks from the Web API

use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{secret::Secret, track::TrackDescriptor};

const PAGE_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("not a playlist URL or id: '{0}'")]
    InvalidPlaylist(String),

    #[error("playlist request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("playlist request rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Deserialize)]
struct TracksPage {
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    /// null for removed or unavailable tracks
    track: Option<TrackObject>,
}

#[derive(Deserialize)]
struct TrackObject {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
}

#[derive(Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorObject,
}

#[derive(Deserialize)]
struct ErrorObject {
    message: String,
}

impl PlaylistItem {
    fn into_descriptor(self) -> Option<TrackDescriptor> {
        let track = self.track?;
        let artist = track
            .artists
            .into_iter()
            .next()
            .map(|a| a.name)
            .unwrap_or_default();
        Some(TrackDescriptor::new(track.name, artist))
    }
}

/// `https://open.spotify.com/playlist/<id>?si=...` -> `<id>`; a bare id passes through.
pub fn playlist_id_from_url(url: &str) -> Result<String, PlaylistError> {
    let trimmed = url.trim().trim_end_matches('/');
    let last_segment = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let id = last_segment.split(['?', '#']).next().unwrap_or_default();
    // `spotify:playlist:<id>` URIs
    let id = id.rsplit(':').next().unwrap_or(id);

    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(PlaylistError::InvalidPlaylist(url.to_string()));
    }
    Ok(id.to_string())
}

pub struct PlaylistClient {
    http_client: Client,
    api_base_url: String,
}

impl PlaylistClient {
    pub fn new(http_client: Client, api_base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            api_base_url: api_base_url.into(),
        }
    }

    fn first_page_url(&self, playlist_id: &str) -> String {
        format!(
            "{}/playlists/{playlist_id}/tracks?limit={PAGE_LIMIT}",
            self.api_base_url.trim_end_matches('/')
        )
    }

    /// All tracks of the playlist, in playlist order, following pagination.
    pub fn fetch_tracks(
        &self,
        token: &Secret,
        playlist_id: &str,
    ) -> Result<Vec<TrackDescriptor>, PlaylistError> {
        let mut tracks = Vec::new();
        let mut next = Some(self.first_page_url(playlist_id));

        while let Some(url) = next {
            debug!("GET {url}");
            let response = self
                .http_client
                .get(&url)
                .bearer_auth(token.expose())
                .send()?;

            let status = response.status();
            if !status.is_success() {
                let message = response
                    .json::<ErrorBody>()
                    .map(|body| body.error.message)
                    .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_string());
                return Err(PlaylistError::Rejected {
                    status: status.as_u16(),
                    message,
                });
            }

            let page: TracksPage = response.json()?;
            tracks.extend(page.items.into_iter().filter_map(PlaylistItem::into_descriptor));
            next = page.next;
        }

        Ok(tracks)
    }
}
