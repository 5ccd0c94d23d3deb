use flate2::{write::GzEncoder, read::GzDecoder, Compression};
use std::io::prelude::*;
use crate::error::StorageResult;

/// Gzip wrapper for document files written by the disk backend.
pub struct CompressionManager {
    enabled: bool,
}

impl CompressionManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn compress(&self, data: &[u8]) -> StorageResult<Vec<u8>> {
        if !self.enabled {
            return Ok(data.to_vec());
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    /// Always gunzips; the caller decides from the file extension.
    pub fn decompress(&self, data: &[u8]) -> StorageResult<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(decompressed)
    }
}
