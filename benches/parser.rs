/*
 * Copyright (C) 2025 Fastly, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use criterion::{criterion_group, criterion_main, Criterion};
use h1stream::parser::{Event, RequestParser, ResponseParser};

const REQS_PER_ITER: usize = 10;

fn pipelined_requests(c: &mut Criterion) {
    let mut data = Vec::new();

    for _ in 0..REQS_PER_ITER {
        data.extend_from_slice(
            b"POST /path HTTP/1.1\r\nHost: example.com\r\nContent-Length: 5\r\n\r\nhello",
        );
    }

    c.bench_function("pipelined requests", |b| {
        b.iter(|| {
            let mut p = RequestParser::new();

            let events = p.feed(&data);
            assert_eq!(events.len(), REQS_PER_ITER * 3);
        })
    });
}

fn chunked_response_bytewise(c: &mut Criterion) {
    let mut data = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();

    for _ in 0..64 {
        data.extend_from_slice(b"10\r\n0123456789abcdef\r\n");
    }
    data.extend_from_slice(b"0\r\n\r\n");

    c.bench_function("chunked response, 1-byte feeds", |b| {
        b.iter(|| {
            let mut p = ResponseParser::new();
            let mut complete = 0;

            for byte in &data {
                for e in p.feed(&[*byte]) {
                    if let Event::MessageComplete(_) = e {
                        complete += 1;
                    }
                }
            }

            assert_eq!(complete, 1);
        })
    });
}

criterion_group!(benches, pipelined_requests, chunked_response_bytewise);
criterion_main!(benches);
