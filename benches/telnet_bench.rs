use criterion::{black_box, criterion_group, criterion_main, Criterion};
use zigcat::telnet::TelnetProcessor;

fn make_plain(repeats: usize) -> Vec<u8> {
    "The quick brown fox jumps over the lazy dog.\r\n"
        .as_bytes()
        .repeat(repeats)
}

/// Same payload but with every 37th byte escaped as a literal `IAC IAC`
/// pair, forcing the processor's carry-over/escape path on every feed.
fn make_escaped(repeats: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, &b) in make_plain(repeats).iter().enumerate() {
        if i % 37 == 0 {
            out.push(0xFF);
        }
        out.push(b);
    }
    out
}

fn bench_feed(c: &mut Criterion) {
    let small = make_plain(100); // ~4.6k
    let med = make_plain(1000); // ~46k
    let large = make_plain(10000); // ~460k
    let escaped_med = make_escaped(1000);

    let mut g = c.benchmark_group("telnet_feed");

    g.bench_function("plain_small", |b| {
        b.iter(|| {
            let mut p = TelnetProcessor::new("xterm", (80, 24));
            black_box(p.feed(black_box(&small)).unwrap())
        })
    });
    g.bench_function("plain_med", |b| {
        b.iter(|| {
            let mut p = TelnetProcessor::new("xterm", (80, 24));
            black_box(p.feed(black_box(&med)).unwrap())
        })
    });
    g.bench_function("plain_large", |b| {
        b.iter(|| {
            let mut p = TelnetProcessor::new("xterm", (80, 24));
            black_box(p.feed(black_box(&large)).unwrap())
        })
    });
    g.bench_function("escaped_med", |b| {
        b.iter(|| {
            let mut p = TelnetProcessor::new("xterm", (80, 24));
            black_box(p.feed(black_box(&escaped_med)).unwrap())
        })
    });

    g.bench_function("fragmented_byte_at_a_time", |b| {
        b.iter(|| {
            let mut p = TelnetProcessor::new("xterm", (80, 24));
            for &byte in &small {
                black_box(p.feed(black_box(&[byte])).unwrap());
            }
        })
    });

    g.finish();
}

criterion_group!(benches, bench_feed);
criterion_main!(benches);
