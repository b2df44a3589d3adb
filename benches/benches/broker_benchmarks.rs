use std::{hint::black_box, num::NonZeroUsize};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use newsbus::{
    news::EVENT_CREATED, Broker, ChannelConfig, FeedPayload, NewsEvent, OverflowPolicy,
    Subscription,
};

/// Ограниченные очереди, чтобы неразобранные сообщения не копились.
fn bounded_broker() -> Broker<FeedPayload> {
    Broker::with_config(ChannelConfig::bounded(
        NonZeroUsize::new(1024).unwrap(),
        OverflowPolicy::DropOldest,
    ))
}

fn payload() -> FeedPayload {
    FeedPayload::NewsFeed(NewsEvent::new("Harry Potter", "Hogwarts"))
}

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");

    for subscribers in [0usize, 1, 10, 100] {
        let broker = bounded_broker();
        let _subs: Vec<Subscription<FeedPayload>> = (0..subscribers)
            .map(|_| broker.subscribe(EVENT_CREATED))
            .collect();
        let payload = payload();

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| black_box(broker.publish(EVENT_CREATED, black_box(payload.clone()))));
            },
        );
    }

    group.finish();
}

fn bench_subscribe_cancel(c: &mut Criterion) {
    let broker = bounded_broker();
    // Постоянный подписчик держит запись топика в реестре
    let _anchor = broker.subscribe(EVENT_CREATED);

    c.bench_function("subscribe_cancel", |b| {
        b.iter(|| {
            let sub = broker.subscribe(black_box(EVENT_CREATED));
            sub.cancel();
        })
    });

    c.bench_function("subscribe_cancel_fresh_topic", |b| {
        b.iter(|| {
            let sub = broker.subscribe(black_box("bench.fresh"));
            drop(sub);
        })
    });
}

fn bench_publish_recv(c: &mut Criterion) {
    let broker = bounded_broker();
    let mut sub = broker.subscribe(EVENT_CREATED);
    let payload = payload();

    c.bench_function("publish_then_try_recv", |b| {
        b.iter(|| {
            broker.publish(EVENT_CREATED, payload.clone());
            black_box(sub.try_recv().ok());
        })
    });

    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    c.bench_function("publish_then_recv_async", |b| {
        b.iter(|| {
            broker.publish(EVENT_CREATED, payload.clone());
            black_box(rt.block_on(sub.recv()));
        })
    });
}

criterion_group!(
    benches,
    bench_publish,
    bench_subscribe_cancel,
    bench_publish_recv,
);
criterion_main!(benches);
