use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use talentbridge_core::UserId;
use talentbridge_infra::jobs::{InMemoryJobStore, JobStore};
use talentbridge_infra::repositories::{Account, InMemoryAccountDirectory};
use talentbridge_infra::{Collaborators, NotificationService, NotifyConfig};
use talentbridge_notifications::{Job, NotificationPayload, Priority};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn job(priority: Priority) -> Job {
    let payload = NotificationPayload::new(UserId::new(), UserId::new(), "connect_request", "bench");
    Job::new(payload, priority)
}

/// Enqueue a mixed-priority batch, then drain it in claim order.
fn bench_enqueue_and_claim(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("queue_enqueue_claim");

    for batch_size in [10usize, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, &size| {
            b.iter(|| {
                rt.block_on(async {
                    let store = InMemoryJobStore::new();
                    for i in 0..size {
                        let priority = Priority::ALL[i % Priority::ALL.len()];
                        store.enqueue(job(priority)).await.unwrap();
                    }
                    let now = Utc::now();
                    while let Some(claimed) = store.claim_next(now).await.unwrap() {
                        black_box(claimed.id);
                    }
                })
            });
        });
    }

    group.finish();
}

/// Status counts over a populated queue.
fn bench_state_counts(c: &mut Criterion) {
    let rt = runtime();
    let store = InMemoryJobStore::new();
    rt.block_on(async {
        for i in 0..1_000 {
            let j = job(Priority::Normal);
            let j = if i % 4 == 0 { j.delayed(Duration::from_secs(600)) } else { j };
            store.enqueue(j).await.unwrap();
        }
    });

    c.bench_function("queue_counts_1000", |b| {
        b.iter(|| rt.block_on(async { black_box(store.counts(Utc::now()).await.unwrap()) }));
    });
}

/// Full pipeline on in-memory collaborators: enqueue, then one worker pass.
fn bench_pipeline_round_trip(c: &mut Criterion) {
    let rt = runtime();
    let accounts = Arc::new(InMemoryAccountDirectory::new());
    let (sender, recipient) = (UserId::new(), UserId::new());
    accounts.upsert(Account::active(sender));
    accounts.upsert(Account::active(recipient));

    let config = NotifyConfig {
        rate_limit_max: u32::MAX,
        throughput_max: u32::MAX,
        ..NotifyConfig::default()
    };
    let service = NotificationService::new(config, Collaborators::in_memory_with_accounts(accounts));
    let pool = service.worker_pool();

    let mut group = c.benchmark_group("pipeline");
    group.sample_size(200);
    group.bench_function("enqueue_process_in_app", |b| {
        b.iter(|| {
            rt.block_on(async {
                let payload = NotificationPayload::new(sender, recipient, "connect_request", "bench")
                    .with_recipient(recipient);
                service
                    .enqueue(payload, Priority::Normal, Duration::ZERO, false)
                    .await
                    .unwrap();
                black_box(pool.process_next().await.unwrap())
            })
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_enqueue_and_claim,
    bench_state_counts,
    bench_pipeline_round_trip
);
criterion_main!(benches);
