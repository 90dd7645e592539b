// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC Round-Trip Benchmark
//!
//! Measures a full call (submit, dispatch, respond, pickup) with the server
//! on a dedicated thread, for different request sizes.

#![allow(clippy::uninlined_format_args)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use micrort::{CallId, Core, CoreConfig, Error, ReplyStatus, ServiceConfig, ServiceId};
use std::hint::black_box as bb;
use std::thread;
use std::time::Duration;

const BENCH_SERVICE: ServiceId = ServiceId(1);

fn echo(_call: CallId, request: &[u8], response: &mut [u8]) -> Result<usize, ReplyStatus> {
    response[..request.len()].copy_from_slice(request);
    Ok(request.len())
}

fn bench_call_by_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("rpc_call_by_size");

    for size in [16usize, 256, 4096] {
        let core = Core::builder()
            .config(CoreConfig::default().with_service(
                BENCH_SERVICE,
                ServiceConfig::default().with_max_payload(size),
            ))
            .build()
            .expect("core creation");
        core.add_service(BENCH_SERVICE).expect("service creation");
        core.start().expect("start");

        let mut server = core.server(BENCH_SERVICE).expect("server");
        let worker = thread::spawn(move || loop {
            match server.serve_one(&echo, Duration::from_millis(10)) {
                Ok(_) => {}
                Err(Error::ShuttingDown) => break,
                Err(e) => panic!("serve failed: {}", e),
            }
        });

        let client = core.client(BENCH_SERVICE).expect("client");
        let request = vec![0xCD; size];
        let mut response = vec![0u8; size];

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let reply = client
                    .call_timeout(bb(&request), &mut response, Duration::from_secs(1))
                    .expect("call");
                bb(reply);
            });
        });

        core.shutdown().expect("shutdown");
        worker.join().expect("server thread");
    }

    group.finish();
}

criterion_group!(benches, bench_call_by_size);
criterion_main!(benches);
