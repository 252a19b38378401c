// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Incremental frame assembler.
//!
//! TCP has no message boundaries. The assembler accumulates bytes fed from
//! the socket and yields one complete frame (header + body) at a time. The
//! fixed header is validated as soon as it is complete, so a bad magic,
//! version or length is rejected before the body is buffered.

use crate::error::CodecError;
use crate::protocol::{HEAD_LENGTH, LENGTH_FIELD_OFFSET, MAGIC, VERSION};

/// Internal state for incremental reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    /// Reading the fixed 16-byte header
    ReadingHeader,

    /// Header validated, waiting for the rest of the frame
    ReadingBody { expected_len: usize },

    /// A protocol fault was seen; the stream is unusable
    Failed,
}

/// Splits a byte stream into complete frames.
#[derive(Debug)]
pub struct FrameAssembler {
    state: ReadState,

    /// Bytes fed but not yet consumed
    accumulator: Vec<u8>,

    /// Read position in accumulator
    accumulator_pos: usize,

    /// Maximum allowed frame size (anti-OOM protection)
    max_size: usize,

    frames_decoded: u64,
    bytes_decoded: u64,
    frames_rejected: u64,
}

impl FrameAssembler {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: ReadState::ReadingHeader,
            accumulator: Vec::with_capacity(16 * 1024),
            accumulator_pos: 0,
            max_size,
            frames_decoded: 0,
            bytes_decoded: 0,
            frames_rejected: 0,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn bytes_decoded(&self) -> u64 {
        self.bytes_decoded
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    /// True while part of a frame is buffered.
    pub fn is_partial(&self) -> bool {
        self.accumulator.len() > self.accumulator_pos
    }

    /// Appends bytes read from the stream.
    pub fn feed(&mut self, data: &[u8]) {
        // Compact once more than half the buffer has been consumed
        if self.accumulator_pos > 0 && self.accumulator_pos > self.accumulator.len() / 2 {
            self.accumulator.drain(..self.accumulator_pos);
            self.accumulator_pos = 0;
        }
        self.accumulator.extend_from_slice(data);
    }

    /// Extracts the next complete frame.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Errors are protocol
    /// faults; once one is returned every later call fails too.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CodecError> {
        loop {
            let available = &self.accumulator[self.accumulator_pos..];

            match self.state {
                ReadState::Failed => return Err(CodecError::StreamPoisoned),

                ReadState::ReadingHeader => {
                    if available.len() < HEAD_LENGTH {
                        return Ok(None);
                    }
                    match validate_header(&available[..HEAD_LENGTH], self.max_size) {
                        Ok(expected_len) => {
                            self.state = ReadState::ReadingBody { expected_len };
                        }
                        Err(e) => {
                            self.frames_rejected += 1;
                            self.state = ReadState::Failed;
                            return Err(e);
                        }
                    }
                }

                ReadState::ReadingBody { expected_len } => {
                    if available.len() < expected_len {
                        return Ok(None);
                    }
                    let frame = available[..expected_len].to_vec();
                    self.accumulator_pos += expected_len;
                    self.frames_decoded += 1;
                    self.bytes_decoded += expected_len as u64;
                    self.state = ReadState::ReadingHeader;
                    return Ok(Some(frame));
                }
            }
        }
    }
}

/// Checks magic, version and declared length. Returns the full frame length.
pub(crate) fn validate_header(header: &[u8], max_size: usize) -> Result<usize, CodecError> {
    if header.len() < HEAD_LENGTH {
        return Err(CodecError::FrameTooShort(header.len()));
    }
    let magic = [header[0], header[1], header[2], header[3]];
    if magic != MAGIC {
        return Err(CodecError::BadMagic(magic));
    }
    if header[4] != VERSION {
        return Err(CodecError::UnsupportedVersion(header[4]));
    }
    let len = read_u32(header, LENGTH_FIELD_OFFSET) as usize;
    if len < HEAD_LENGTH {
        return Err(CodecError::FrameTooShort(len));
    }
    if len > max_size {
        return Err(CodecError::FrameTooLarge { len, max: max_size });
    }
    Ok(len)
}

#[inline]
pub(crate) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: u8, correlation_id: u32, body: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&((HEAD_LENGTH + body.len()) as u32).to_be_bytes());
        buf.extend_from_slice(&[kind, 1, 0]);
        buf.extend_from_slice(&correlation_id.to_be_bytes());
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn test_single_frame() {
        let mut asm = FrameAssembler::new(1024);
        let f = frame(1, 7, b"{}");
        asm.feed(&f);
        assert_eq!(asm.next_frame().expect("frame"), Some(f));
        assert_eq!(asm.next_frame().expect("empty"), None);
        assert_eq!(asm.frames_decoded(), 1);
    }

    #[test]
    fn test_byte_by_byte() {
        let mut asm = FrameAssembler::new(1024);
        let f = frame(2, 1, b"hello");
        for (i, b) in f.iter().enumerate() {
            asm.feed(std::slice::from_ref(b));
            let out = asm.next_frame().expect("no fault");
            if i + 1 < f.len() {
                assert!(out.is_none());
            } else {
                assert_eq!(out, Some(f.clone()));
            }
        }
    }

    #[test]
    fn test_multiple_frames_one_chunk() {
        let mut asm = FrameAssembler::new(1024);
        let a = frame(3, 1, b"");
        let b = frame(1, 2, b"payload");
        let mut chunk = a.clone();
        chunk.extend_from_slice(&b);
        asm.feed(&chunk);
        assert_eq!(asm.next_frame().expect("a"), Some(a));
        assert_eq!(asm.next_frame().expect("b"), Some(b));
        assert!(!asm.is_partial());
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut asm = FrameAssembler::new(1024);
        let mut f = frame(1, 1, b"x");
        f[0] = b'F';
        asm.feed(&f);
        assert!(matches!(asm.next_frame(), Err(CodecError::BadMagic(_))));
        assert!(matches!(asm.next_frame(), Err(CodecError::StreamPoisoned)));
        assert_eq!(asm.frames_rejected(), 1);
    }

    #[test]
    fn test_bad_version_is_fatal() {
        let mut asm = FrameAssembler::new(1024);
        let mut f = frame(1, 1, b"x");
        f[4] = VERSION + 1;
        asm.feed(&f);
        assert!(matches!(
            asm.next_frame(),
            Err(CodecError::UnsupportedVersion(v)) if v == VERSION + 1
        ));
    }

    #[test]
    fn test_oversized_rejected_before_body() {
        let mut asm = FrameAssembler::new(64);
        let f = frame(1, 1, &[0u8; 100]);
        asm.feed(&f[..HEAD_LENGTH]);
        assert!(matches!(
            asm.next_frame(),
            Err(CodecError::FrameTooLarge { len: 116, max: 64 })
        ));
    }

    #[test]
    fn test_length_below_header() {
        let mut asm = FrameAssembler::new(1024);
        let mut f = frame(1, 1, b"");
        f[5..9].copy_from_slice(&3u32.to_be_bytes());
        asm.feed(&f);
        assert!(matches!(asm.next_frame(), Err(CodecError::FrameTooShort(3))));
    }
}
