// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Codec Benchmark
//!
//! Measures frame encode/decode cost per serializer and compressor, and the
//! consistent-hash selection path used on every call.

#![allow(clippy::uninlined_format_args)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flowrpc::loadbalance::{ConsistentHashLoadBalance, LoadBalance};
use flowrpc::protocol::MAX_FRAME_LENGTH;
use flowrpc::{
    CompressorKind, Extensions, MessageBody, RpcMessage, RpcRequest, SerializerKind, ServiceKey,
};
use serde_json::json;
use std::sync::Arc;

fn request(payload_len: usize) -> RpcRequest {
    RpcRequest::new(
        &ServiceKey::new("Greeter").with_version("v1"),
        "hello",
        vec!["string".to_string()],
        vec![json!("x".repeat(payload_len))],
    )
}

fn combinations() -> Vec<(SerializerKind, CompressorKind)> {
    let mut out = vec![
        (SerializerKind::Json, CompressorKind::None),
        (SerializerKind::Json, CompressorKind::Gzip),
    ];
    #[cfg(feature = "cbor")]
    out.push((SerializerKind::Cbor, CompressorKind::None));
    #[cfg(feature = "lz4")]
    out.push((SerializerKind::Json, CompressorKind::Lz4));
    out
}

fn bench_encode_decode(c: &mut Criterion) {
    let codec = Extensions::builtin().codec(MAX_FRAME_LENGTH);
    let mut group = c.benchmark_group("codec_roundtrip");

    for payload_len in [64usize, 4096] {
        for (serializer, compressor) in combinations() {
            let message = RpcMessage::new(
                serializer,
                compressor,
                42,
                MessageBody::Request(request(payload_len)),
            );
            let id = format!("{}/{}/{}", serializer.name(), compressor.name(), payload_len);
            group.bench_with_input(BenchmarkId::from_parameter(id), &message, |b, msg| {
                b.iter(|| {
                    let frame = codec.encode(black_box(msg)).expect("encode");
                    black_box(codec.decode(&frame).expect("decode"))
                });
            });
        }
    }
    group.finish();
}

fn bench_consistent_hash(c: &mut Criterion) {
    let lb = ConsistentHashLoadBalance::new();
    let providers: Arc<Vec<String>> =
        Arc::new((0..16).map(|i| format!("10.0.0.{}:9998", i)).collect());
    let req = request(16);

    c.bench_function("consistent_hash_select", |b| {
        b.iter(|| black_box(lb.select(&providers, black_box(&req))));
    });
}

criterion_group!(benches, bench_encode_decode, bench_consistent_hash);
criterion_main!(benches);
