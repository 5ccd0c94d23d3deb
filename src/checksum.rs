use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

/// Hex-encoded SHA-256 digest of the content's UTF-8 bytes.
pub fn checksum(content: &str) -> String {
    checksum_with(ChecksumAlgorithm::Sha256, content)
}

pub fn checksum_with(algorithm: ChecksumAlgorithm, content: &str) -> String {
    match algorithm {
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(content.as_bytes());
            hex::encode(hasher.finalize())
        }
        ChecksumAlgorithm::Blake3 => blake3::hash(content.as_bytes()).to_hex().to_string(),
    }
}
