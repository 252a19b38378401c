// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::Compressor;
use crate::error::PayloadError;
use crate::protocol::CompressorKind;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

const BUFFER_SIZE: usize = 4 * 1024;

/// Gzip bodies via `flate2`.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl GzipCompressor {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for GzipCompressor {
    fn kind(&self) -> CompressorKind {
        CompressorKind::Gzip
    }

    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, PayloadError> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2 + 32), self.level);
        encoder.write_all(bytes).map_err(PayloadError::new)?;
        encoder.finish().map_err(PayloadError::new)
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, PayloadError> {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::with_capacity(bytes.len() * 2);
        let mut buffer = [0u8; BUFFER_SIZE];
        loop {
            let n = decoder.read(&mut buffer).map_err(PayloadError::new)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buffer[..n]);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_roundtrip_large() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let gz = GzipCompressor::default();
        let packed = gz.compress(&data).expect("compress");
        assert!(packed.len() < data.len());
        assert_eq!(gz.decompress(&packed).expect("decompress"), data);
    }

    #[test]
    fn test_gzip_corrupt_input() {
        let gz = GzipCompressor::new(6);
        assert!(gz.decompress(b"definitely not gzip").is_err());
    }
}
