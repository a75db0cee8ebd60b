//! Builds the collaborators the handlers and CLI commands share.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use log::warn;
use reqwest::blocking::Client;

use crate::{
    archive::{
        ArchiveWriter, ZipArchiveWriter,
        batch::{BatchArchiver, BatchSettings},
    },
    blob::{BlobStore, HttpBlobStore},
    config::{Config, ConfigError, Secrets, SourceConfig},
    fetch::{
        AudioSource, Fetcher, Tool, extract::ExtractToolSource, http_api::HttpApiSource,
        scrape::ScrapeSource,
    },
    pacing::{Sleeper, ThreadSleeper},
    spotify::auth::{SpotifyAuth, TokenExchanger},
};

const USER_AGENT: &str = concat!("playlist-dl/", env!("CARGO_PKG_VERSION"));

/// Everything a request needs. Collaborators whose secrets are missing
/// hold the [`ConfigError`] instead, so the request fails rather than
/// the process.
pub struct Services {
    pub fetcher: Arc<Fetcher>,
    pub writer: Arc<dyn ArchiveWriter>,
    pub sleeper: Arc<dyn Sleeper>,
    pub batch: BatchSettings,
    pub track_prefix: String,
    pub blob_store: Result<Arc<dyn BlobStore>, ConfigError>,
    pub token_exchanger: Result<Arc<dyn TokenExchanger>, ConfigError>,
}

impl Services {
    pub fn from_config(config: &Config, secrets: &Secrets) -> anyhow::Result<Self> {
        let http_client = build_http_client(Duration::from_secs(config.http.client_timeout_secs))?;
        let sleeper: Arc<dyn Sleeper> = Arc::new(ThreadSleeper);

        let source = build_source(&config.source, &http_client);
        let fetcher = Fetcher::new(source, config.retry.settings(), Arc::clone(&sleeper));

        let blob_store = secrets.blob_token().map(|token| {
            Arc::new(HttpBlobStore::new(
                http_client.clone(),
                config.blob.base_url.clone(),
                token,
            )) as Arc<dyn BlobStore>
        });
        if let Err(e) = &blob_store {
            warn!("Downloads will fail until configured: {e}");
        }

        let token_exchanger = secrets.oauth_credentials().map(|credentials| {
            Arc::new(SpotifyAuth::new(
                http_client.clone(),
                config.spotify.token_url.clone(),
                credentials,
            )) as Arc<dyn TokenExchanger>
        });
        if let Err(e) = &token_exchanger {
            warn!("Token exchange will fail until configured: {e}");
        }

        Ok(Self {
            fetcher: Arc::new(fetcher),
            writer: Arc::new(ZipArchiveWriter),
            sleeper,
            batch: config.batch_settings(),
            track_prefix: config.publish.track_prefix.clone(),
            blob_store,
            token_exchanger,
        })
    }

    pub fn archiver(&self) -> BatchArchiver {
        BatchArchiver::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.writer),
            Arc::clone(&self.sleeper),
            self.batch.clone(),
        )
    }
}

pub fn build_http_client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

pub fn build_source(config: &SourceConfig, http_client: &Client) -> Box<dyn AudioSource> {
    match config {
        SourceConfig::HttpApi { base_url } => {
            Box::new(HttpApiSource::new(http_client.clone(), base_url.clone()))
        }
        SourceConfig::ExtractTool {
            ytdlp_bin,
            audio_format,
            temp_dir,
        } => {
            let source = ExtractToolSource::new(Tool::new(ytdlp_bin), audio_format.clone());
            match temp_dir {
                Some(dir) => Box::new(source.with_temp_root(dir)),
                None => Box::new(source),
            }
        }
        SourceConfig::Scrape {
            site_url,
            query_suffix,
            ytdlp_bin,
            ffmpeg_bin,
        } => Box::new(ScrapeSource::new(
            http_client.clone(),
            site_url.clone(),
            query_suffix.clone(),
            Tool::new(ytdlp_bin),
            Tool::new(ffmpeg_bin),
        )),
    }
}
