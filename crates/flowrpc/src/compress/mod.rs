// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Body compressors selected by the `compress` header byte.

mod gzip;
#[cfg(feature = "lz4")]
mod lz4;

pub use gzip::GzipCompressor;
#[cfg(feature = "lz4")]
pub use lz4::Lz4Compressor;

use crate::error::PayloadError;
use crate::protocol::CompressorKind;

/// Compresses serialized bodies.
pub trait Compressor: Send + Sync {
    fn kind(&self) -> CompressorKind;

    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, PayloadError>;

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, PayloadError>;
}

/// Pass-through compressor (`none`).
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCompressor;

impl Compressor for IdentityCompressor {
    fn kind(&self) -> CompressorKind {
        CompressorKind::None
    }

    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, PayloadError> {
        Ok(bytes.to_vec())
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, PayloadError> {
        Ok(bytes.to_vec())
    }
}
