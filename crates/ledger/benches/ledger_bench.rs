use common::{IdempotencyKey, PurchasePath};
use criterion::{Criterion, criterion_group, criterion_main};
use ledger::{InMemoryLedgerStore, LedgerSeed, LedgerStore, Purchase};

fn bench_unprotected_commit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("ledger/unprotected_commit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryLedgerStore::with_seed(LedgerSeed::new(1, 100));
                store
                    .try_commit(PurchasePath::Unprotected, None, Purchase::new(10))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_protected_commit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("ledger/protected_commit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryLedgerStore::with_seed(LedgerSeed::new(1, 100));
                let key = IdempotencyKey::new();
                store
                    .try_commit(PurchasePath::Protected, Some(&key), Purchase::new(10))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_protected_replay(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLedgerStore::with_seed(LedgerSeed::new(1, 100));
    let key = IdempotencyKey::new();
    rt.block_on(async {
        store
            .try_commit(PurchasePath::Protected, Some(&key), Purchase::new(10))
            .await
            .unwrap();
    });

    c.bench_function("ledger/protected_replay", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .try_commit(PurchasePath::Protected, Some(&key), Purchase::new(10))
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_unprotected_commit,
    bench_protected_commit,
    bench_protected_replay
);
criterion_main!(benches);
