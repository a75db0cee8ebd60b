//! In-process fakes for the external collaborators, shared by unit tests.

use std::{
    collections::VecDeque,
    io::{Cursor, Read},
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{
    blob::{BlobError, BlobStore},
    domain::secret::Secret,
    fetch::{AudioPayload, AudioSource, SourceError},
    pacing::Sleeper,
    spotify::auth::{AccessToken, AuthError, TokenExchanger},
};

/// Ordered record of every call made into the fakes
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn sleeps_ms(&self) -> Vec<u64> {
        self.events()
            .iter()
            .filter_map(|e| e.strip_prefix("sleep:"))
            .map(|ms| ms.parse().unwrap())
            .collect()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

pub struct RecordingSleeper {
    log: EventLog,
}

impl RecordingSleeper {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.log.push(format!("sleep:{}", duration.as_millis()));
    }
}

/// Answers from a fixed script, then echoes the query back as audio.
pub struct ScriptedSource {
    log: EventLog,
    script: Mutex<VecDeque<Result<Vec<u8>, SourceError>>>,
}

impl ScriptedSource {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            script: Mutex::new(VecDeque::new()),
        }
    }

    pub fn then_ok(self, bytes: &[u8]) -> Self {
        self.script.lock().unwrap().push_back(Ok(bytes.to_vec()));
        self
    }

    pub fn then_err(self, err: SourceError) -> Self {
        self.script.lock().unwrap().push_back(Err(err));
        self
    }
}

impl AudioSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn fetch(&self, query: &str) -> Result<AudioPayload, SourceError> {
        self.log.push(format!("fetch:{query}"));
        match self.script.lock().unwrap().pop_front() {
            Some(result) => result.map(AudioPayload::from),
            None => Ok(AudioPayload::from(query.as_bytes().to_vec())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub path: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub struct RecordingBlobStore {
    log: EventLog,
    pub stored: Mutex<Vec<StoredBlob>>,
    fail: bool,
}

impl RecordingBlobStore {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            stored: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing(log: EventLog) -> Self {
        Self {
            fail: true,
            ..Self::new(log)
        }
    }

    pub fn stored(&self) -> Vec<StoredBlob> {
        self.stored.lock().unwrap().clone()
    }
}

impl BlobStore for RecordingBlobStore {
    fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, BlobError> {
        self.log.push(format!("put:{path}"));
        if self.fail {
            return Err(BlobError::Rejected {
                status: 503,
                body: "store unavailable".into(),
            });
        }
        self.stored.lock().unwrap().push(StoredBlob {
            path: path.to_string(),
            bytes,
            content_type: content_type.to_string(),
        });
        Ok(format!("https://blob.test/{path}"))
    }
}

/// Accepts exactly one authorization code
pub struct FakeTokenExchanger {
    log: EventLog,
    pub valid_code: String,
}

impl FakeTokenExchanger {
    pub fn new(log: EventLog, valid_code: &str) -> Self {
        Self {
            log,
            valid_code: valid_code.to_string(),
        }
    }
}

impl TokenExchanger for FakeTokenExchanger {
    fn exchange(&self, code: &str, redirect_uri: &str) -> Result<AccessToken, AuthError> {
        self.log.push(format!("exchange:{code}:{redirect_uri}"));
        if code == self.valid_code {
            Ok(AccessToken {
                access_token: Secret::new(format!("token-for-{code}")),
                token_type: Some("Bearer".into()),
                expires_in: Some(3600),
            })
        } else {
            Err(AuthError::Rejected {
                status: 400,
                payload: serde_json::json!({
                    "error": "invalid_grant",
                    "error_description": "Invalid authorization code"
                }),
            })
        }
    }
}

/// Names and contents of every file in a zip, in archive order
pub fn read_zip(bytes: Vec<u8>) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut out = Vec::new();
    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        out.push((file.name().to_string(), content));
    }
    Ok(out)
}
