use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion};

use wafer::builder::{fact, int, pred, rule, var};
use wafer::{Block, Limits, Verifier};

fn chain_inputs(links: i64) -> (Block, Verifier, Limits) {
    // reached($m) <- reached($n), edge($n, $m): one pass per link
    let mut authority = Block::new(b"bench-generic".to_vec(), b"bench-unique".to_vec());
    authority.add_rule(
        rule(
            "reached",
            [var("m")],
            vec![
                pred("reached", [var("n")]),
                pred("edge", [var("n"), var("m")]),
            ],
        )
        .unwrap(),
    );
    authority.add_fact(fact("reached", [int(0)]).unwrap());
    for i in 0..links {
        authority.add_fact(fact("edge", [int(i), int(i + 1)]).unwrap());
    }

    let mut verifier = Verifier::new();
    verifier.add_policy(
        wafer::builder::allow(vec![wafer::builder::query(vec![pred(
            "reached",
            [int(links)],
        )])
        .unwrap()])
        .unwrap(),
    );

    let limits = Limits::default()
        .with_max_facts(100_000)
        .with_max_iterations(1_000)
        .with_max_time_us(60_000_000);

    (authority, verifier, limits)
}

fn product_inputs(seeds: i64) -> (Block, Verifier, Limits) {
    // pair($x, $y) <- seed($x), seed($y): quadratic single-pass blowup
    let mut authority = Block::new(b"bench-generic".to_vec(), b"bench-unique".to_vec());
    authority.add_rule(
        rule(
            "pair",
            [var("x"), var("y")],
            vec![pred("seed", [var("x")]), pred("seed", [var("y")])],
        )
        .unwrap(),
    );
    for i in 0..seeds {
        authority.add_fact(fact("seed", [int(i)]).unwrap());
    }

    let mut verifier = Verifier::new();
    verifier.allow_all();

    let limits = Limits::default()
        .with_max_facts(100_000)
        .with_max_iterations(1_000)
        .with_max_time_us(60_000_000);

    (authority, verifier, limits)
}

fn bench_chain_saturation(c: &mut Criterion) {
    c.bench_function("fixpoint/chain_64", |b| {
        b.iter_custom(|iters| {
            // Inputs are immutable; building them stays outside the timing.
            let (authority, verifier, limits) = chain_inputs(64);

            let start = Instant::now();
            for _ in 0..iters {
                verifier.verify(&authority, &[], &limits).unwrap();
            }
            start.elapsed()
        });
    });
}

fn bench_product_saturation(c: &mut Criterion) {
    c.bench_function("fixpoint/product_32", |b| {
        b.iter_custom(|iters| {
            let (authority, verifier, limits) = product_inputs(32);

            let start = Instant::now();
            for _ in 0..iters {
                verifier.verify(&authority, &[], &limits).unwrap();
            }
            start.elapsed()
        });
    });
}

criterion_group!(benches, bench_chain_saturation, bench_product_saturation);
criterion_main!(benches);
