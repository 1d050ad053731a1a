// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use serde_json::Value;
use webfront::context::normalize_value;
use webfront::{Request, RequestContext};

const BROWSER_REQUEST: &[u8] = b"GET /users/5?tab=profile&page=2&tags[]=a&tags[]=b HTTP/1.1\r\n\
                    Host: localhost:7878\r\n\
                    User-Agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64)\r\n\
                    Accept: text/html,application/xhtml+xml\r\n\
                    Accept-Encoding: gzip, deflate, br\r\n\
                    Cookie: webfront_sid=0f1e2d3c4b5a69788796a5b4c3d2e1f0; theme=dark\r\n\
                    \r\n";

fn request_parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse");

    let requests = [
        (
            "minimal",
            b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n".as_slice(),
        ),
        ("browser", BROWSER_REQUEST),
        (
            "form_post",
            b"POST /users HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 27\r\n\r\nname=Tom+Jerry&age=%2042%20".as_slice(),
        ),
    ];

    for (name, request) in requests.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), request, |b, request| {
            b.iter(|| {
                let _ = Request::try_from(black_box(request), 0).unwrap();
            });
        });
    }

    group.finish();
}

fn request_context_benchmark(c: &mut Criterion) {
    let request = Request::try_from(BROWSER_REQUEST, 0).unwrap();

    c.bench_function("request_context_from_request", |b| {
        b.iter(|| RequestContext::from_request(black_box(&request)));
    });
}

fn normalize_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_value");

    let cases = [
        ("int", "int", Value::from(" 42 ")),
        ("trim_xss", "trim|xss", Value::from("  <script>alert(1)</script>hello  ")),
        ("strip_tags", "strip_tags", Value::from("<p>Hello <b>world</b></p>")),
    ];

    for (name, types, value) in cases.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), value, |b, value| {
            b.iter(|| normalize_value(black_box(value.clone()), types));
        });
    }

    group.finish();
}

fn request_parse_batch_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_batch");

    for count in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                for id in 0..count {
                    let request = Request::try_from(black_box(BROWSER_REQUEST), id).unwrap();
                    black_box(RequestContext::from_request(&request));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    request_parse_benchmark,
    request_context_benchmark,
    normalize_benchmark,
    request_parse_batch_benchmark
);
criterion_main!(benches);
