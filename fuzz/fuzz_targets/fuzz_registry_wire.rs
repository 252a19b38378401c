// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use flowrpc::registry::wire::{StoreReply, StoreRequest};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Registry server request parser
    let _ = serde_json::from_slice::<StoreRequest>(data);

    // Client-side reply parser
    let _ = serde_json::from_slice::<StoreReply>(data);
});
