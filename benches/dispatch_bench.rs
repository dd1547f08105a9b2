//! Criterion benchmarks for property dispatch.
//!
//! Measures the local half of get/set (validation, value maps, transforms,
//! formatting and response parsing) without transport latency, plus a full
//! round trip through the mock adapter.
//!
//! Run with: cargo bench --bench dispatch_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use scpi_instrument::adapters::MockAdapter;
use scpi_instrument::models::rigol_dm3058;
use scpi_instrument::{Validator, Value};

fn encode_set(c: &mut Criterion) {
    let model = rigol_dm3058().unwrap();
    let mut group = c.benchmark_group("encode_set");

    let cases = [
        ("truncated_map", "voltage_range", Value::Float(1.5)),
        ("strict_range", "continuity_limit", Value::Float(50.0)),
        ("lookup", "function", Value::from("resistance 4W")),
        ("choose", "voltage_filter", Value::Bool(true)),
    ];
    for (name, property, value) in cases {
        let descriptor = model.registry().lookup(property).unwrap();
        group.bench_with_input(BenchmarkId::new("encode", name), &value, |b, value| {
            b.iter(|| descriptor.encode_set(black_box(value.clone())).unwrap());
        });
    }
    group.finish();
}

fn decode_get(c: &mut Criterion) {
    let model = rigol_dm3058().unwrap();
    let mut group = c.benchmark_group("decode_get");

    let cases = [
        ("float", "voltage", "+1.23456E-01"),
        ("reverse_map", "resistance_range", "4"),
        ("lookup", "function", "DCV"),
        ("equals", "current_filter", "ON"),
    ];
    for (name, property, response) in cases {
        let descriptor = model.registry().lookup(property).unwrap();
        group.bench_with_input(BenchmarkId::new("decode", name), &response, |b, response| {
            b.iter(|| descriptor.decode_get(black_box(response)).unwrap());
        });
    }
    group.finish();
}

fn validators(c: &mut Criterion) {
    let domain: Vec<Value> = [200e-6, 2e-3, 20e-3, 200e-3, 2.0, 10.0]
        .into_iter()
        .map(Value::Float)
        .collect();

    c.bench_function("truncated_discrete_set", |b| {
        b.iter(|| {
            Validator::TruncatedDiscreteSet
                .apply(black_box(Value::Float(0.15)), &domain)
                .unwrap()
        });
    });
}

fn round_trip(c: &mut Criterion) {
    let model = rigol_dm3058().unwrap();
    let adapter = MockAdapter::new().with_reply(":MEAS:VOLT:DC:RANG?", "1");
    let handle = adapter.handle();
    let mut dmm = model.connect(adapter).unwrap();

    c.bench_function("mock_set_get", |b| {
        b.iter(|| {
            dmm.set("voltage_range", black_box(1.5)).unwrap();
            let value = dmm.get("voltage_range").unwrap();
            handle.clear_log();
            value
        });
    });
}

criterion_group!(benches, encode_set, decode_get, validators, round_trip);
criterion_main!(benches);
