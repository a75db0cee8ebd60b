use rouille::Response;
use serde::{Deserialize, Serialize};

use crate::{
    archive::batch::BatchError, config::ConfigError, fetch::FetchError, spotify::auth::AuthError,
};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    MethodNotAllowed,
    NotFound,
    Config(ConfigError),
    Internal {
        error: String,
        details: Option<serde_json::Value>,
    },
}

/// JSON body of every failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::Config(err)
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        ApiError::internal("Failed to download track", err.to_string())
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        ApiError::internal("Failed to create ZIP file", err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Internal {
            error: "Failed to exchange token".into(),
            details: Some(err.details()),
        }
    }
}

impl ApiError {
    pub fn internal(error: &str, details: String) -> Self {
        ApiError::Internal {
            error: error.to_string(),
            details: Some(serde_json::Value::String(details)),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::NotFound => 404,
            ApiError::MethodNotAllowed => 405,
            ApiError::Config(_) | ApiError::Internal { .. } => 500,
        }
    }

    fn body(self) -> ErrorBody {
        match self {
            ApiError::BadRequest(msg) => ErrorBody {
                error: msg,
                details: None,
            },
            ApiError::MethodNotAllowed => ErrorBody {
                error: "Method Not Allowed".into(),
                details: None,
            },
            ApiError::NotFound => ErrorBody {
                error: "Not Found".into(),
                details: None,
            },
            ApiError::Config(err) => ErrorBody {
                error: "Server configuration error: Missing environment variables".into(),
                details: Some(serde_json::Value::String(err.to_string())),
            },
            ApiError::Internal { error, details } => ErrorBody { error, details },
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status_code();
        Response::json(&self.body()).with_status_code(status)
    }
}
