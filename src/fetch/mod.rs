//! Single-track fetching: audio source backends and the retry loop around them

use std::{
    ffi::OsStr,
    path::PathBuf,
    process::Command,
    sync::Arc,
    time::Duration,
};

use log::{debug, warn};
use serde::Deserialize;

use crate::pacing::Sleeper;

pub mod error;
pub mod extract;
pub mod http_api;
pub mod scrape;

pub use error::{FetchError, SourceError};

/// Raw bytes of one audio file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload(Vec<u8>);

impl AudioPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for AudioPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Something that turns a search query into audio.
///
/// One attempt per call; retrying is the [`Fetcher`]'s job.
pub trait AudioSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch(&self, query: &str) -> Result<AudioPayload, SourceError>;
}

/// Which failures are worth another attempt
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// HTTP 429 or an equivalent signal from a tool
    RateLimitOnly,
    /// rate limits, network failures and gateway errors
    #[default]
    Transient,
    AnyFailure,
}

impl RetryPolicy {
    pub fn is_retryable(&self, err: &SourceError) -> bool {
        match self {
            RetryPolicy::RateLimitOnly => err.is_rate_limit(),
            RetryPolicy::Transient => err.is_rate_limit() || err.is_transient(),
            RetryPolicy::AnyFailure => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// total attempts, the first one included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub policy: RetryPolicy,
}

impl RetrySettings {
    /// wait before the attempt following the failed attempt `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
            policy: RetryPolicy::default(),
        }
    }
}

/// Lives for one `fetch_track` call only
struct RetryState {
    attempt: u32,
}

/// Fetches one track at a time from an [`AudioSource`], retrying per [`RetrySettings`].
pub struct Fetcher {
    source: Box<dyn AudioSource>,
    retry: RetrySettings,
    sleeper: Arc<dyn Sleeper>,
}

impl Fetcher {
    pub fn new(source: Box<dyn AudioSource>, retry: RetrySettings, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            source,
            retry,
            sleeper,
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn fetch_track(&self, query: &str) -> Result<AudioPayload, FetchError> {
        self.fetch_track_with(query, &self.retry)
    }

    pub fn fetch_track_with(
        &self,
        query: &str,
        retry: &RetrySettings,
    ) -> Result<AudioPayload, FetchError> {
        let max_attempts = retry.max_attempts.max(1);
        let mut state = RetryState { attempt: 0 };

        loop {
            let err = match self.source.fetch(query) {
                Ok(payload) => {
                    debug!(
                        "{} returned {} bytes for '{}' on attempt {}",
                        self.source.name(),
                        payload.len(),
                        query,
                        state.attempt + 1
                    );
                    return Ok(payload);
                }
                Err(err) => err,
            };

            let has_attempts_left = state.attempt + 1 < max_attempts;
            if !has_attempts_left || !retry.policy.is_retryable(&err) {
                return Err(FetchError {
                    query: query.to_string(),
                    attempts: state.attempt + 1,
                    source: err,
                });
            }

            let wait = retry.backoff(state.attempt);
            warn!(
                "{} failed for '{}' (attempt {}/{}): {}; retrying in {}ms",
                self.source.name(),
                query,
                state.attempt + 1,
                max_attempts,
                err,
                wait.as_millis()
            );
            self.sleeper.sleep(wait);
            state.attempt += 1;
        }
    }
}

/// Maps a response status to the error an audio source reports for it.
pub(crate) fn check_status(status: reqwest::StatusCode) -> Result<(), SourceError> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(SourceError::RateLimited);
    }
    if !status.is_success() {
        return Err(SourceError::Http {
            status: status.as_u16(),
        });
    }
    Ok(())
}

/// Whether an external tool's stderr reports throttling
pub(crate) fn looks_rate_limited(stderr: &str) -> bool {
    stderr.contains("HTTP Error 429") || stderr.contains("Too Many Requests")
}

/// An external program plus the arguments that always come first
#[derive(Debug, Clone)]
pub struct Tool {
    program: PathBuf,
    base_args: Vec<String>,
}

impl Tool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self::with_args(program, Vec::new())
    }

    pub fn with_args(program: impl Into<PathBuf>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
        }
    }

    pub fn name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(OsStr::new("tool"))
            .to_string_lossy()
            .into_owned()
    }

    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args);
        cmd
    }

    /// Turns the stderr of a failed run into a [`SourceError`].
    pub(crate) fn failure(&self, stderr: &[u8]) -> SourceError {
        let stderr = String::from_utf8_lossy(stderr);
        if looks_rate_limited(&stderr) {
            return SourceError::RateLimited;
        }
        let message = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("exited with an error")
            .trim()
            .to_string();
        SourceError::Tool {
            tool: self.name(),
            message,
        }
    }
}
