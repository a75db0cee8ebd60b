//! Download API backend: one GET per query, the body is the audio file.

use reqwest::blocking::Client;

use super::{AudioPayload, AudioSource, SourceError, check_status};

pub struct HttpApiSource {
    http_client: Client,
    base_url: String,
}

impl HttpApiSource {
    pub fn new(http_client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
        }
    }

    fn download_url(&self) -> String {
        format!("{}/download", self.base_url.trim_end_matches('/'))
    }
}

impl AudioSource for HttpApiSource {
    fn name(&self) -> &'static str {
        "download-api"
    }

    fn fetch(&self, query: &str) -> Result<AudioPayload, SourceError> {
        let response = self
            .http_client
            .get(self.download_url())
            .query(&[("q", query)])
            .send()?;

        check_status(response.status())?;

        let bytes = response.bytes()?;
        if bytes.is_empty() {
            return Err(SourceError::NoMatch(query.to_string()));
        }
        Ok(AudioPayload::from(bytes.to_vec()))
    }
}
