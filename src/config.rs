use anyhow::Context;
use log::info;
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

use crate::{
    archive::batch::{BatchSettings, DEFAULT_ARCHIVE_PATH},
    blob::PublishNaming,
    domain::secret::Secret,
    fetch::{RetryPolicy, RetrySettings},
    spotify::{self, auth::OAuthCredentials},
};

pub const SPOTIFY_CLIENT_ID: &str = "SPOTIFY_CLIENT_ID";
pub const SPOTIFY_CLIENT_SECRET: &str = "SPOTIFY_CLIENT_SECRET";
pub const SPOTIFY_REDIRECT_URI: &str = "SPOTIFY_REDIRECT_URI";
pub const BLOB_READ_WRITE_TOKEN: &str = "BLOB_READ_WRITE_TOKEN";

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    pub http: HttpConfig,
    pub source: SourceConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
    pub publish: PublishConfig,
    pub blob: BlobConfig,
    pub spotify: SpotifyConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }

    /// Like [`Config::load`], but a missing file means all defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Config> {
        if path.exists() {
            Self::load(path)
        } else {
            info!("No config at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            inter_request_delay: Duration::from_millis(self.batch.inter_request_delay_ms),
            archive_path: self.publish.archive_path.clone(),
            naming: self.publish.naming(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
    /// timeout for every outbound HTTP request
    pub client_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            client_timeout_secs: 120,
        }
    }
}

/// Which audio source backs this deployment
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum SourceConfig {
    HttpApi {
        #[serde(default = "default_api_base_url")]
        base_url: String,
    },
    ExtractTool {
        #[serde(default = "default_ytdlp_bin")]
        ytdlp_bin: PathBuf,
        #[serde(default = "default_audio_format")]
        audio_format: String,
        #[serde(default)]
        temp_dir: Option<PathBuf>,
    },
    Scrape {
        #[serde(default = "default_site_url")]
        site_url: String,
        #[serde(default = "default_query_suffix")]
        query_suffix: Option<String>,
        #[serde(default = "default_ytdlp_bin")]
        ytdlp_bin: PathBuf,
        #[serde(default = "default_ffmpeg_bin")]
        ffmpeg_bin: PathBuf,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::HttpApi {
            base_url: default_api_base_url(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://music-downloader-api.com".to_string()
}

fn default_ytdlp_bin() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_ffmpeg_bin() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

fn default_site_url() -> String {
    "https://www.youtube.com".to_string()
}

fn default_query_suffix() -> Option<String> {
    Some("lyrics".to_string())
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub policy: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let defaults = RetrySettings::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_backoff_ms: defaults.initial_backoff.as_millis() as u64,
            policy: defaults.policy,
        }
    }
}

impl RetryConfig {
    pub fn settings(&self) -> RetrySettings {
        RetrySettings {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            policy: self.policy,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BatchConfig {
    pub inter_request_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            inter_request_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PublishConfig {
    pub archive_path: String,
    /// directory single-track uploads go to
    pub track_prefix: String,
    pub content_addressed: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            archive_path: DEFAULT_ARCHIVE_PATH.to_string(),
            track_prefix: "tracks".to_string(),
            content_addressed: false,
        }
    }
}

impl PublishConfig {
    pub fn naming(&self) -> PublishNaming {
        PublishNaming {
            content_addressed: self.content_addressed,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BlobConfig {
    pub base_url: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            base_url: "https://blob.vercel-storage.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SpotifyConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub api_base_url: String,
    pub scopes: Vec<String>,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            authorize_url: spotify::DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: spotify::DEFAULT_TOKEN_URL.to_string(),
            api_base_url: spotify::DEFAULT_API_BASE_URL.to_string(),
            scopes: vec![
                "playlist-read-private".to_string(),
                "playlist-read-collaborative".to_string(),
            ],
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<&'static str>),
}

/// Values that only ever come from the environment
#[derive(Debug, Default, Clone)]
pub struct Secrets {
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<Secret>,
    pub spotify_redirect_uri: Option<String>,
    pub blob_token: Option<Secret>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// empty values count as missing
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            spotify_client_id: get(SPOTIFY_CLIENT_ID),
            spotify_client_secret: get(SPOTIFY_CLIENT_SECRET).map(Secret::from),
            spotify_redirect_uri: get(SPOTIFY_REDIRECT_URI),
            blob_token: get(BLOB_READ_WRITE_TOKEN).map(Secret::from),
        }
    }

    pub fn oauth_credentials(&self) -> Result<OAuthCredentials, ConfigError> {
        match (
            &self.spotify_client_id,
            &self.spotify_client_secret,
            &self.spotify_redirect_uri,
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Ok(OAuthCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                redirect_uri: redirect_uri.clone(),
            }),
            _ => {
                let missing = [
                    (SPOTIFY_CLIENT_ID, self.spotify_client_id.is_none()),
                    (SPOTIFY_CLIENT_SECRET, self.spotify_client_secret.is_none()),
                    (SPOTIFY_REDIRECT_URI, self.spotify_redirect_uri.is_none()),
                ]
                .into_iter()
                .filter_map(|(key, is_missing)| is_missing.then_some(key))
                .collect();
                Err(ConfigError::MissingEnv(missing))
            }
        }
    }

    pub fn blob_token(&self) -> Result<Secret, ConfigError> {
        self.blob_token
            .clone()
            .ok_or_else(|| ConfigError::MissingEnv(vec![BLOB_READ_WRITE_TOKEN]))
    }
}
