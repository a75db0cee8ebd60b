use std::fmt::Display;

use blake3::Hash;

/// Number of hex characters kept when a hash is embedded in a path
const SHORT_HEX_LEN: usize = 16;

/// Hash of a serialized artifact (an archive or a single track).
///
/// Used to give every distinct upload its own blob-store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(pub Hash);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    pub fn short_hex(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(SHORT_HEX_LEN);
        hex
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
