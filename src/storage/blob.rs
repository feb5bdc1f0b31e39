//! Blob record and its stored representation.

use serde::{Deserialize, Serialize};

/// A JSON document stored under `(container, name)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub container: String,
}

impl BlobRecord {
    pub fn new(container: &str, name: &str, body: &str) -> Self {
        Self {
            body: body.to_string(),
            name: name.to_string(),
            container: container.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
