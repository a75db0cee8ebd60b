//! OAuth authorization-code flow against the streaming service

use log::{info, warn};
use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::domain::secret::Secret;

#[derive(Debug, Error)]
pub enum AuthError {
    /// the identity provider answered, and said no
    #[error("token endpoint rejected the exchange with HTTP {status}")]
    Rejected {
        status: u16,
        payload: serde_json::Value,
    },

    #[error("token endpoint unreachable: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid authorize endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl AuthError {
    /// what the client gets to see about the failure
    pub fn details(&self) -> serde_json::Value {
        match self {
            AuthError::Rejected { payload, .. } => payload.clone(),
            other => serde_json::Value::String(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AccessToken {
    pub access_token: Secret,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Client id, secret and registered redirect URI of this application
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: Secret,
    pub redirect_uri: String,
}

pub trait TokenExchanger: Send + Sync {
    fn exchange(&self, code: &str, redirect_uri: &str) -> Result<AccessToken, AuthError>;
}

pub struct SpotifyAuth {
    http_client: Client,
    token_url: String,
    credentials: OAuthCredentials,
}

impl SpotifyAuth {
    pub fn new(http_client: Client, token_url: impl Into<String>, credentials: OAuthCredentials) -> Self {
        Self {
            http_client,
            token_url: token_url.into(),
            credentials,
        }
    }
}

impl TokenExchanger for SpotifyAuth {
    fn exchange(&self, code: &str, redirect_uri: &str) -> Result<AccessToken, AuthError> {
        info!(
            "Exchanging authorization code for client {} (redirect {})",
            self.credentials.client_id, redirect_uri
        );

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.expose()),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            let payload = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
            warn!("Token exchange rejected with HTTP {status}: {payload}");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                payload,
            });
        }

        Ok(response.json()?)
    }
}

/// Login URL the browser is sent to; the provider redirects back with `?code=`.
pub fn authorize_url(
    authorize_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[String],
) -> Result<Url, AuthError> {
    let scope = scopes.join(" ");
    Ok(Url::parse_with_params(
        authorize_endpoint,
        &[
            ("client_id", client_id),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
        ],
    )?)
}
