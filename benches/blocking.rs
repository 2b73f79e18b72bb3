use std::sync::Arc;
use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use identilink::{
    BlockingConfig, BlockingEngine, BlockingStrategy, Entity, InMemoryEntityStore,
    PerformanceMonitor, SimilarityScores,
};

const FIRST: [&str; 8] = ["John", "Jon", "Asha", "Meera", "Mira", "Rahul", "Raoul", "Priya"];
const LAST: [&str; 6] = ["Carter", "Kartar", "Verma", "Varma", "Nair", "Raman"];

fn population(n: usize) -> Vec<Entity> {
    (0..n)
        .map(|i| {
            let first = FIRST[i % FIRST.len()];
            let last = LAST[(i / FIRST.len()) % LAST.len()];
            Entity::new(format!("E{i:05}"))
                .with_name(format!("{first} {last}"))
                .with_email(format!("{}{}{i}@campus.edu", first.to_lowercase(), &last[..1]))
                .with_phone(format!("555-01{:02}-{:04}", i % 100, i % 9973))
                .with_department(format!("D{}", i % 25))
                .with_student_id(format!("S{:06}", i))
                .with_device_hash(format!("dev-{:x}", i % 4096))
        })
        .collect()
}

fn engine_for(entities: &[Entity]) -> BlockingEngine {
    BlockingEngine::new(
        Arc::new(InMemoryEntityStore::with_entities(entities.to_vec())),
        Arc::new(PerformanceMonitor::default()),
        BlockingConfig::default(),
    )
}

fn bench_indexing(c: &mut Criterion) {
    let entities = population(5_000);
    let mut group = c.benchmark_group("indexing");
    group.throughput(Throughput::Elements(1));

    group.bench_function("index_entity", |b| {
        b.iter_custom(|iters| {
            // Fresh engine per sample so bucket growth does not leak between samples.
            let engine = engine_for(&[]);
            let start = Instant::now();
            for i in 0..iters {
                #[allow(clippy::cast_possible_truncation)]
                let e = &entities[(i as usize) % entities.len()];
                engine.index_entity(black_box(e)).unwrap();
            }
            start.elapsed()
        });
    });
    group.finish();

    let mut group = c.benchmark_group("rebuild");
    group.throughput(Throughput::Elements(entities.len() as u64));
    group.sample_size(10);
    let engine = engine_for(&entities);
    group.bench_function("build_indexes_5k", |b| {
        b.iter(|| black_box(engine.build_indexes().unwrap()));
    });
    group.finish();
}

fn bench_candidates(c: &mut Criterion) {
    let entities = population(5_000);
    let engine = engine_for(&entities);
    engine.build_indexes().unwrap();

    let mut group = c.benchmark_group("get_candidates");
    group.throughput(Throughput::Elements(1));
    for strategy in [
        BlockingStrategy::Phonetic,
        BlockingStrategy::Identifier,
        BlockingStrategy::Department,
        BlockingStrategy::MultiPass,
    ] {
        group.bench_function(strategy.to_string(), |b| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 1) % entities.len();
                black_box(engine.get_candidates(&entities[i], strategy))
            });
        });
    }
    group.finish();
}

fn bench_features(c: &mut Criterion) {
    let entities = population(2);
    let scores = SimilarityScores::new().with_name(0.9).with_email(0.4).with_face(0.8);
    c.bench_function("scoring/extract_features", |b| {
        b.iter(|| {
            black_box(identilink::scoring::extract_features(
                &entities[0],
                &entities[1],
                &scores,
            ))
        });
    });
}

criterion_group!(blocking, bench_indexing, bench_candidates, bench_features);
criterion_main!(blocking);
