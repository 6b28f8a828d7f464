//! Windower and rate converter benchmarks

use aq_core::{CLASSIFIER_WINDOW_LEN, StreamConfig};
use aq_dsp::{RateConverter, Windower};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn bench_windower_push(c: &mut Criterion) {
    let config = StreamConfig::at_model_rate(48000.0, 512).unwrap();
    let mut windower = Windower::new();
    windower.prepare(config.fifo_size()).unwrap();

    let block: Vec<f32> = (0..512).map(|i| (i as f32 * 0.01).sin()).collect();

    c.bench_function("windower_push_512", |b| {
        b.iter(|| {
            for &s in &block {
                black_box(windower.push(black_box(s)));
            }
        })
    });
}

fn bench_convert_48k(c: &mut Criterion) {
    let config = StreamConfig::at_model_rate(48000.0, 512).unwrap();
    let mut converter = RateConverter::new();
    converter
        .prepare(config.fifo_size(), CLASSIFIER_WINDOW_LEN)
        .unwrap();

    let window: Vec<f32> = (0..config.fifo_size())
        .map(|i| (i as f32 * 0.01).sin())
        .collect();
    let mut output = vec![0.0; CLASSIFIER_WINDOW_LEN];

    c.bench_function("convert_window_48k", |b| {
        b.iter(|| {
            converter
                .convert(black_box(&window), black_box(&mut output))
                .unwrap();
        })
    });
}

criterion_group!(benches, bench_windower_push, bench_convert_48k);
criterion_main!(benches);
