use std::fmt;

use serde::Deserialize;

/// A credential or token.
///
/// Has no `Display` impl, and `Debug` prints a placeholder, so a secret
/// can't end up in a log line by accident. Call [`Secret::expose`] at the
/// single place where the raw value is sent to a remote service.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}
