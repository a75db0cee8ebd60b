//! Publishing artifacts to an external blob store

use log::info;
use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{hash::ContentHash, secret::Secret};

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob store request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("blob store rejected upload with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Accepts bytes under a logical path and hands back a public URL
pub trait BlobStore: Send + Sync {
    fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, BlobError>;
}

const API_VERSION: &str = "7";

#[derive(Deserialize)]
struct PutResponse {
    url: String,
}

/// Blob store speaking the Vercel Blob REST protocol
pub struct HttpBlobStore {
    http_client: Client,
    base_url: String,
    token: Secret,
}

impl HttpBlobStore {
    pub fn new(http_client: Client, base_url: impl Into<String>, token: Secret) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
            token,
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl BlobStore for HttpBlobStore {
    fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, BlobError> {
        let size = bytes.len();
        let response = self
            .http_client
            .put(self.object_url(path))
            .bearer_auth(self.token.expose())
            .header("x-api-version", API_VERSION)
            .header("x-content-type", content_type)
            .header("x-add-random-suffix", "0")
            .header("x-access", "public")
            .body(bytes)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BlobError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let PutResponse { url } = response.json()?;
        info!("Published {path} ({size} bytes) at {url}");
        Ok(url)
    }
}

/// Decides the blob-store key an artifact is published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishNaming {
    /// insert a content hash into every path
    pub content_addressed: bool,
}

impl PublishNaming {
    /// `playlists/playlist.zip` stays as is, or becomes
    /// `playlists/playlist-<hash>.zip` when content addressed.
    pub fn path_for(&self, base_path: &str, bytes: &[u8]) -> String {
        if !self.content_addressed {
            return base_path.to_string();
        }

        let hash = ContentHash::of(bytes).short_hex();
        let file_start = base_path.rfind('/').map_or(0, |slash| slash + 1);
        match base_path[file_start..].rfind('.') {
            Some(dot) if dot > 0 => {
                let dot = file_start + dot;
                format!("{}-{hash}{}", &base_path[..dot], &base_path[dot..])
            }
            _ => format!("{base_path}-{hash}"),
        }
    }
}
