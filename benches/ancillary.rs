//! 制御メッセージベンチマーク
//!
//! レコードタイプの cmsg エンコード/解析と、UnixStream ペア上での
//! sendmsg / recvmsg 往復を測定します。
//!
//! 使用方法:
//!   cargo bench --bench ancillary

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::IoSlice;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;

use zerocopy_ktls::io::{recv_msg, send_msg};
use zerocopy_ktls::platform::{SOL_TLS, TLS_GET_RECORD_TYPE};
use zerocopy_ktls::{AncillaryBuffer, RecordType};

/// 送信用 cmsg の構築
fn benchmark_encode(c: &mut Criterion) {
    c.bench_function("cmsg_encode_record_type", |b| {
        let mut buf = AncillaryBuffer::for_send();
        b.iter(|| {
            buf.set_record_type(black_box(RecordType::ApplicationData));
            black_box(buf.len())
        });
    });
}

/// 受信 cmsg の走査
fn benchmark_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("cmsg_parse");

    for entries in [1usize, 4] {
        let mut buf = AncillaryBuffer::for_send();
        for _ in 0..entries - 1 {
            buf.push(libc::SOL_SOCKET, 0, &[0]).unwrap();
        }
        buf.push(SOL_TLS, TLS_GET_RECORD_TYPE, &[23]).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(entries), &buf, |b, buf| {
            b.iter(|| black_box(buf.record_type().ok()));
        });
    }

    group.finish();
}

/// UnixStream ペアでの往復
fn benchmark_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("socketpair_round_trip");

    for size in [64usize, 1024, 16 * 1024] {
        let (a, b) = match UnixStream::pair() {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("socketpair failed: {}, skipping", e);
                return;
            }
        };
        let payload = vec![0xABu8; size];
        let mut recv_buf = vec![0u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bench, &size| {
            bench.iter(|| {
                let sent = send_msg(
                    a.as_raw_fd(),
                    RecordType::ApplicationData,
                    &[IoSlice::new(&payload)],
                )
                .unwrap_or(0);
                let mut received = 0;
                while received < sent {
                    match recv_msg(b.as_raw_fd(), &mut recv_buf[received..size]) {
                        Ok((n, _)) => received += n,
                        Err(_) => break,
                    }
                }
                black_box(received)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_encode, benchmark_parse, benchmark_round_trip);
criterion_main!(benches);
