// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Plugin manifest format.
//!
//! One resource per capability, newline separated `name=implementation`
//! entries. Text after `#` is a comment. Blank and malformed lines are
//! skipped.

use crate::error::ExtensionError;
use std::path::PathBuf;

/// Where a loader reads manifest entries from.
#[derive(Debug, Clone)]
pub enum ManifestSource {
    /// Manifest compiled into the binary.
    Embedded(&'static str),
    /// Directory containing one file per capability, named after it.
    Directory(PathBuf),
}

impl ManifestSource {
    /// Reads the manifest text for `capability`. A directory without a file
    /// for the capability yields `None`.
    pub fn read(&self, capability: &'static str) -> Result<Option<String>, ExtensionError> {
        match self {
            Self::Embedded(text) => Ok(Some((*text).to_string())),
            Self::Directory(dir) => {
                let path = dir.join(capability);
                match std::fs::read_to_string(&path) {
                    Ok(text) => Ok(Some(text)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(ExtensionError::Manifest {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    }),
                }
            }
        }
    }
}

/// Parses manifest text into `(name, implementation)` pairs in file order.
pub fn parse_manifest(text: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for raw in text.lines() {
        let line = match raw.find('#') {
            Some(idx) => &raw[..idx],
            None => raw,
        }
        .trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, implementation)) = line.split_once('=') else {
            log::debug!("[EXT] skipping malformed manifest line {:?}", raw);
            continue;
        };
        let (name, implementation) = (name.trim(), implementation.trim());
        if name.is_empty() || implementation.is_empty() {
            log::debug!("[EXT] skipping incomplete manifest line {:?}", raw);
            continue;
        }
        entries.push((name.to_string(), implementation.to_string()));
    }
    entries
}
