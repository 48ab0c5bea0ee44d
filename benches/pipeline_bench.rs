//! Benchmarks for seed-sieve
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn benchmark_queue_operations(c: &mut Criterion) {
    use seed_sieve::pipeline::{Candidate, CandidateQueue};
    use std::time::Duration;

    c.bench_function("queue_enqueue_dequeue", |b| {
        let queue = CandidateQueue::new(10_000);
        let producer = queue.producer();
        let consumer = queue.consumer();

        b.iter(|| {
            let candidate = Candidate::new("abandon ability able".into(), 18);
            producer.try_enqueue(candidate);
            black_box(consumer.dequeue(Duration::ZERO));
        })
    });
}

fn benchmark_encoding(c: &mut Criterion) {
    use seed_sieve::entropy::{EntropySource, SeededEntropySource};
    use seed_sieve::mnemonic::{letter_count, Bip39Encoder, MnemonicEncoder};

    let blocks = SeededEntropySource::new(42).generate(1024).unwrap();
    let encoder = Bip39Encoder::english();

    c.bench_function("bip39_encode_and_measure", |b| {
        let mut i = 0;
        b.iter(|| {
            let phrase = encoder.encode(&blocks[i % blocks.len()]).unwrap();
            i += 1;
            black_box(letter_count(&phrase))
        })
    });

    c.bench_function("entropy_batch_2048", |b| {
        let source = SeededEntropySource::new(7);
        b.iter(|| black_box(source.generate(2048).unwrap()))
    });
}

fn benchmark_selection(c: &mut Criterion) {
    use seed_sieve::pipeline::{Candidate, ResultLedger, SelectionPolicy};

    let policy = SelectionPolicy::new(46, 42, 5);
    let stream: Vec<Candidate> = (0..10_000)
        .map(|n| Candidate::new(format!("phrase {}", n), 40 + n % 10))
        .collect();

    c.bench_function("ledger_offer_10k", |b| {
        b.iter(|| {
            let mut ledger = ResultLedger::new();
            for candidate in &stream {
                black_box(ledger.offer(&policy, candidate));
            }
            ledger.total()
        })
    });
}

fn benchmark_throttle(c: &mut Criterion) {
    use seed_sieve::pipeline::{throttle_factor, ThrottleState};

    c.bench_function("throttle_factor", |b| {
        b.iter(|| throttle_factor(black_box(0.95), black_box(0.80)))
    });

    c.bench_function("throttle_snapshot_read", |b| {
        let (mut reader, _publisher) = ThrottleState::pair();
        b.iter(|| black_box(reader.snapshot()))
    });
}

criterion_group!(
    benches,
    benchmark_queue_operations,
    benchmark_encoding,
    benchmark_selection,
    benchmark_throttle
);
criterion_main!(benches);
