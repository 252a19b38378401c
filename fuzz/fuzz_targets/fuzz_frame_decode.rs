// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use flowrpc::protocol::MAX_FRAME_LENGTH;
use flowrpc::Extensions;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let codec = Extensions::builtin().codec(MAX_FRAME_LENGTH);

    // Whole input as one frame
    let _ = codec.decode(data);

    // Same bytes through the stream assembler, split unevenly
    let mut assembler = codec.assembler();
    for chunk in data.chunks(7) {
        assembler.feed(chunk);
        while let Ok(Some(frame)) = assembler.next_frame() {
            let _ = codec.decode(&frame);
        }
    }
});
