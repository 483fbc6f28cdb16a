//! Benchmarks for buy-point detection.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use buypoint::prelude::*;

/// Deterministic zig-zag bars with MACD columns attached
fn generate_bars(n: usize) -> Vec<Bar> {
  let mut bars = Vec::with_capacity(n);
  let mut price = 100.0;

  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 50.0 - 1.0; // Deterministic "random"
    let volatility = 2.0 + ((i * 3) % 10) as f64 / 5.0;

    let o = price;
    let c = price + change;
    let h = o.max(c) + volatility * 0.5;
    let l = o.min(c) - volatility * 0.5;

    bars.push(Bar::new(o, h, l, c, 1000.0).at(i as i64));
    price = c;
  }

  with_macd(bars, &MacdParams::default())
}

fn bench_today(c: &mut Criterion) {
  let bars = generate_bars(1000);
  let engine = EngineBuilder::new().build().unwrap();

  c.bench_function("analyze_today_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.analyze_today(black_box(&bars)));
    })
  });
}

fn bench_history(c: &mut Criterion) {
  let bars = generate_bars(1000);
  let engine = EngineBuilder::new().build().unwrap();

  c.bench_function("analyze_history_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.analyze_history(black_box(&bars)));
    })
  });
}

fn bench_macd(c: &mut Criterion) {
  let closes: Vec<f64> = generate_bars(1000).iter().map(|b| b.close).collect();
  let params = MacdParams::default();

  c.bench_function("macd_columns_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(macd_columns(black_box(&closes), black_box(&params)));
    })
  });
}

fn bench_scaling(c: &mut Criterion) {
  let engine = EngineBuilder::new().build().unwrap();

  let mut group = c.benchmark_group("scaling");

  for size in [100, 500, 1000, 5000, 10000].iter() {
    let bars = generate_bars(*size);

    group.bench_with_input(BenchmarkId::new("analyze_today", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(engine.analyze_today(black_box(&bars)));
      })
    });
  }

  group.finish();
}

fn bench_parallel_scan(c: &mut Criterion) {
  let daily = generate_bars(1000);
  let hourly = generate_bars(1000);

  let engine = EngineBuilder::new().build().unwrap();

  let levels: Vec<(Level, &[Bar])> =
    vec![(Level::Daily, daily.as_slice()), (Level::Min60, hourly.as_slice())];
  let instruments: Vec<(&str, &[(Level, &[Bar])])> =
    ["SYM1", "SYM2", "SYM3", "SYM4"].into_iter().map(|s| (s, levels.as_slice())).collect();

  c.bench_function("parallel_scan_4_instruments", |b| {
    b.iter(|| {
      let _ = black_box(scan_parallel(black_box(&engine), black_box(instruments.clone())));
    })
  });
}

criterion_group!(
  benches,
  bench_today,
  bench_history,
  bench_macd,
  bench_scaling,
  bench_parallel_scan,
);

criterion_main!(benches);
