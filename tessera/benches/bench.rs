use criterion::{criterion_group, criterion_main, Criterion};
use tessera::order::order;
use tessera::{Cancel, Config, Engine, Mode};

/// Definitions where every definition uses its predecessor.
fn chain(n: usize) -> String {
    let defs = (1..n).map(|i| format!("def d{} := d{}.\n", i, i - 1));
    core::iter::once("def d0 := 0.\n".to_string()).chain(defs).collect()
}

/// Definitions that form cycles of the given length.
fn cycles(n: usize, len: usize) -> String {
    let def = |i: usize| {
        let next = i - i % len + (i + 1) % len;
        format!("def d{} := d{}.\n", i, next)
    };
    (0..n).map(def).collect()
}

fn resolved(src: &str) -> Engine {
    let config = Config {
        mode: Mode::Off,
        ..Config::default()
    };
    let engine = Engine::new(config);
    let mut session = engine.session(vec!["B".to_string()]);
    let group = tessera_syntax::parse(src);
    session.update(&group, &Cancel::new()).unwrap();
    drop(session);
    engine
}

fn check(src: &str) {
    let engine = Engine::new(Config::default());
    let mut session = engine.session(vec!["B".to_string()]);
    let group = tessera_syntax::parse(src);
    let update = session.update(&group, &Cancel::new()).unwrap();
    update.wait().unwrap().unwrap();
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let chain = chain(1000);
    let cycles = cycles(1000, 10);

    let concretes = resolved(&chain).provider().concretes();
    c.bench_function("order chain", |b| b.iter(|| order(&concretes, &Cancel::new())));
    let concretes = resolved(&cycles).provider().concretes();
    c.bench_function("order cycles", |b| b.iter(|| order(&concretes, &Cancel::new())));

    c.bench_function("parse chain", |b| b.iter(|| tessera_syntax::parse(&chain)));
    c.bench_function("resolve chain", |b| b.iter(|| resolved(&chain)));
    c.bench_function("check chain", |b| b.iter(|| check(&chain)));
    c.bench_function("check cycles", |b| b.iter(|| check(&cycles)));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
