//! Throughput Benchmark for atmod
//!
//! Measures the per-line costs on the command path: framing host bytes,
//! matching a line against the command table, decoding arguments, and
//! scanning certificates for their common name.

use atmod::commands::find_command;
use atmod::protocol::{Cursor, LineReader};
use atmod::tls::der::common_name;
use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

const LINES: &[&[u8]] = &[
    b"AT\r\n",
    b"AT+CIPSEND=4,512\r\n",
    b"AT+CIPSTART=0,\"SSL\",\"example.com\",443\r\n",
    b"AT+CIPSSLCERT=DELETE,1\r\n",
    b"AT+CWJAP_CUR=\"home\",\"secret\"\r\n",
];

/// Benchmark command table lookup
fn bench_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("match");
    group.throughput(Throughput::Elements(LINES.len() as u64));

    group.bench_function("mixed_lines", |b| {
        b.iter(|| {
            for line in LINES {
                let _ = black_box(find_command(black_box(line)));
            }
        });
    });

    // Falls through the whole table
    group.bench_function("unknown", |b| {
        b.iter(|| black_box(find_command(black_box(b"AT+NOSUCHCOMMAND=1\r\n"))));
    });

    group.finish();
}

/// Benchmark argument decoding
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("cipstart_args", |b| {
        let line = b"=\"TCP\",\"192.168.1.10\",8080,60\r\n";
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(line), 0);
            let _ = cursor.expect(b'=');
            let kind = cursor.read_string(false, false);
            let _ = cursor.expect(b',');
            let host = cursor.read_string(false, false);
            let _ = cursor.expect(b',');
            let port = cursor.read_number();
            black_box((kind, host, port))
        });
    });

    group.bench_function("escaped_string", |b| {
        let line = b"\"my\\,wifi\\\"net\",\"pa\\\\ss\"\r\n";
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(line), 0);
            black_box(cursor.read_string(true, false))
        });
    });

    group.bench_function("fingerprint", |b| {
        let line =
            b"\"4f:2b:9c:11:0a:3e:77:d5:19:c0:ee:42:8b:6a:01:f3:5d:90:aa:7c\"\r\n";
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(line), 0);
            black_box(cursor.read_fingerprint())
        });
    });

    group.bench_function("ipv4", |b| {
        let line = b"\"10.20.30.40\"\r\n";
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(line), 0);
            black_box(cursor.read_ipv4())
        });
    });

    group.finish();
}

/// Benchmark host stream framing
fn bench_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("framing");

    let mut stream = Vec::new();
    for _ in 0..200 {
        for line in LINES {
            stream.extend_from_slice(line);
        }
    }
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("pipelined_lines", |b| {
        b.iter(|| {
            let mut reader = LineReader::default();
            let mut buf = BytesMut::from(&stream[..]);
            let mut frames = 0usize;
            while reader.next_frame(&mut buf).is_some() {
                frames += 1;
            }
            black_box(frames)
        });
    });

    group.finish();
}

/// Benchmark certificate common-name extraction
fn bench_common_name(c: &mut Criterion) {
    let cert = rcgen::generate_simple_self_signed(vec!["bench.example".to_string()])
        .expect("generate certificate");
    let der = cert.serialize_der().expect("serialize certificate");

    let mut group = c.benchmark_group("der");
    group.throughput(Throughput::Bytes(der.len() as u64));

    group.bench_function("common_name", |b| {
        b.iter(|| black_box(common_name(black_box(&der))));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_match,
    bench_decode,
    bench_framing,
    bench_common_name
);
criterion_main!(benches);
