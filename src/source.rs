use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Submitted component source. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUnit {
    text: String,
    byte_len: usize,
    hash: String,
}

impl SourceUnit {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let byte_len = text.len();
        let hash = compute_hash(&text);
        Self {
            text,
            byte_len,
            hash,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Hex SHA-256 of the text.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub fn compute_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}
