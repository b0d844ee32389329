//! 脚本执行性能基准测试
//!
//! 测试脚本求值、宿主函数调用和从宿主调用脚本函数的开销

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use script_engine::{HostFunction, ScriptEngine, ScriptValue};

fn bench_evaluate(c: &mut Criterion) {
    let engine = ScriptEngine::new().unwrap();

    c.bench_function("evaluate_arithmetic", |b| {
        b.iter(|| black_box(engine.evaluate(black_box("1 + 2 * 3")).unwrap()))
    });

    let mut group = c.benchmark_group("evaluate_loop");
    for count in [100, 1000, 10000].iter() {
        let source = format!("var sum = 0; for (var i = 0; i < {count}; i++) {{ sum += i; }} sum");
        group.bench_with_input(BenchmarkId::from_parameter(count), &source, |b, source| {
            b.iter(|| black_box(engine.evaluate(source).unwrap()))
        });
    }
    group.finish();
}

fn bench_host_calls(c: &mut Criterion) {
    let engine = ScriptEngine::new().unwrap();
    engine
        .bind_function(HostFunction::from_fn("Math", "mix", |a: f64, b: f64| a * 0.5 + b))
        .unwrap();

    let mut group = c.benchmark_group("host_calls");
    for count in [10, 100, 1000].iter() {
        let source = format!("var acc = 0; for (var i = 0; i < {count}; i++) {{ acc = mix(acc, i); }} acc");
        group.bench_with_input(BenchmarkId::from_parameter(count), &source, |b, source| {
            b.iter(|| black_box(engine.evaluate(source).unwrap()))
        });
    }
    group.finish();
}

fn bench_call_function(c: &mut Criterion) {
    let engine = ScriptEngine::new().unwrap();
    engine
        .evaluate("function lerp(a, b, t) { return a + (b - a) * t; }")
        .unwrap();
    engine
        .evaluate("var physics = { step: function (dt) { return dt * 60; } };")
        .unwrap();

    let args = [
        ScriptValue::from(0.0),
        ScriptValue::from(10.0),
        ScriptValue::from(0.25),
    ];
    c.bench_function("call_function", |b| {
        b.iter(|| black_box(engine.call_function("lerp", black_box(&args)).unwrap()))
    });

    let dt = [ScriptValue::from(0.016)];
    c.bench_function("call_object_method", |b| {
        b.iter(|| black_box(engine.call_object_method("physics.step", black_box(&dt)).unwrap()))
    });
}

criterion_group!(benches, bench_evaluate, bench_host_calls, bench_call_function);
criterion_main!(benches);
