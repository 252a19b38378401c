// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::Compressor;
use crate::error::PayloadError;
use crate::protocol::CompressorKind;

/// LZ4 block compression with the uncompressed size prepended.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn kind(&self) -> CompressorKind {
        CompressorKind::Lz4
    }

    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, PayloadError> {
        Ok(lz4_flex::compress_prepend_size(bytes))
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, PayloadError> {
        lz4_flex::decompress_size_prepended(bytes).map_err(PayloadError::new)
    }
}
