use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use futures::StreamExt;
use newsbus::{Broker, ChannelConfig, OverflowPolicy, TryRecvError};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_millis(200);

/// Тест проверяет реальный сценарий использования: два подписчика в
/// отдельных задачах получают все сообщения своего топика в порядке
/// публикации.
#[tokio::test]
async fn test_real_world_usage_example() -> Result<(), Box<dyn std::error::Error>> {
    let broker = Arc::new(Broker::<String>::new());

    let mut user_sub = broker.subscribe("user.notifications");
    let mut audit_sub = broker.subscribe("user.notifications");

    let user_task = tokio::spawn(async move {
        let mut messages = Vec::new();
        for _ in 0..3 {
            match user_sub.recv().await {
                Some(msg) => messages.push(msg.payload),
                None => break,
            }
        }
        messages
    });
    let audit_task = tokio::spawn(async move {
        let mut count = 0;
        while let Some(_msg) = audit_sub.recv().await {
            count += 1;
            if count == 3 {
                break;
            }
        }
        count
    });

    broker.publish("user.notifications", "New message arrived".to_string());
    broker.publish("user.notifications", "Friend request received".to_string());
    broker.publish("admin.security", "Failed login attempt".to_string());
    broker.publish("user.notifications", "Email verified".to_string());

    let (user_messages, audit_count) =
        tokio::join!(timeout(WAIT, user_task), timeout(WAIT, audit_task));

    assert_eq!(
        user_messages??,
        vec![
            "New message arrived",
            "Friend request received",
            "Email verified"
        ]
    );
    assert_eq!(audit_count??, 3);
    Ok(())
}

#[tokio::test]
async fn test_fifo_interleaved_with_recv() {
    let broker = Broker::<u32>::new();
    let mut sub = broker.subscribe("t");

    let mut received = Vec::new();
    for i in 0..100 {
        broker.publish("t", i);
        if i % 3 == 0 {
            let msg = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
            received.push(msg.payload);
        }
    }
    while let Ok(msg) = sub.try_recv() {
        received.push(msg.payload);
    }

    assert_eq!(received, (0..100).collect::<Vec<_>>());
}

/// Тест проверяет отсутствие ретроактивной доставки.
#[tokio::test]
async fn test_no_retroactive_delivery() {
    let broker = Broker::<&'static str>::new();
    assert_eq!(broker.publish("EVENT_CREATED", "before"), 0);

    let mut sub = broker.subscribe("EVENT_CREATED");
    assert_eq!(sub.try_recv(), Err(TryRecvError::Empty));

    broker.publish("EVENT_CREATED", "after");
    let msg = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
    assert_eq!(msg.payload, "after");
}

#[tokio::test]
async fn test_cancel_then_publish_leaves_no_trace() {
    let broker = Broker::<u8>::new();
    let mut sub = broker.subscribe("t");
    sub.cancel();
    sub.cancel();

    assert_eq!(broker.publish("t", 1), 0);
    assert!(broker.active_topics().is_empty());
    assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), None);

    let m = broker.metrics();
    assert_eq!(m.subscriptions_created, 1);
    assert_eq!(m.subscriptions_cancelled, 1);
}

/// Тест проверяет, что отмена из другой задачи будит ожидающий `recv`.
#[tokio::test]
async fn test_cancel_handle_wakes_pending_recv() {
    let broker = Broker::<u8>::new();
    let mut sub = broker.subscribe("t");
    let handle = sub.cancel_handle();

    let waiter = tokio::spawn(async move { sub.recv().await });
    tokio::task::yield_now().await;
    handle.cancel();

    assert_eq!(timeout(WAIT, waiter).await.unwrap().unwrap(), None);
    assert!(handle.is_cancelled());
    assert_eq!(broker.subscriber_count("t"), 0);
}

#[test]
fn test_merged_topics_keep_publish_order() {
    let broker = Broker::<u32>::new();
    let mut sub = broker.subscribe_many(["EVENT_CREATED", "FETCH_EVENTS"]);

    broker.publish("EVENT_CREATED", 1);
    broker.publish("FETCH_EVENTS", 2);
    broker.publish("EVENT_CREATED", 3);

    let got: Vec<(String, u32)> = (0..3)
        .map(|_| {
            let m = sub.try_recv().unwrap();
            (m.topic().to_string(), m.payload)
        })
        .collect();
    assert_eq!(
        got,
        vec![
            ("EVENT_CREATED".to_string(), 1),
            ("FETCH_EVENTS".to_string(), 2),
            ("EVENT_CREATED".to_string(), 3),
        ]
    );
}

#[tokio::test]
async fn test_stream_ends_after_cancel() {
    let broker = Broker::<u32>::new();
    let sub = broker.subscribe("t");
    let handle = sub.cancel_handle();
    let mut stream = Box::pin(sub.into_stream());

    broker.publish("t", 7);
    assert_eq!(stream.next().await.map(|m| m.payload), Some(7));

    handle.cancel();
    assert!(timeout(WAIT, stream.next()).await.unwrap().is_none());
}

#[test]
fn test_bounded_drop_oldest_keeps_latest() {
    let broker = Broker::<u32>::with_config(ChannelConfig::bounded(
        NonZeroUsize::new(2).unwrap(),
        OverflowPolicy::DropOldest,
    ));
    let mut sub = broker.subscribe("t");

    for i in 1..=5 {
        assert_eq!(broker.publish("t", i), 1);
    }
    assert_eq!(sub.try_recv().unwrap().payload, 4);
    assert_eq!(sub.try_recv().unwrap().payload, 5);
    assert_eq!(broker.metrics().evicted, 3);
}

#[test]
fn test_bounded_drop_newest_rejects() {
    let broker = Broker::<u32>::with_config(ChannelConfig::bounded(
        NonZeroUsize::new(2).unwrap(),
        OverflowPolicy::DropNewest,
    ));
    let mut sub = broker.subscribe("t");

    assert_eq!(broker.publish("t", 1), 1);
    assert_eq!(broker.publish("t", 2), 1);
    assert_eq!(broker.publish("t", 3), 0);

    assert_eq!(sub.try_recv().unwrap().payload, 1);
    assert_eq!(sub.try_recv().unwrap().payload, 2);
    assert_eq!(sub.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(broker.metrics().rejected, 1);
}

/// Тест проверяет, что переполнение с политикой `Cancel` отменяет только
/// медленного подписчика.
#[test]
fn test_bounded_cancel_policy_cancels_slow_subscriber() {
    let broker = Broker::<u32>::with_config(ChannelConfig::bounded(
        NonZeroUsize::new(1).unwrap(),
        OverflowPolicy::Cancel,
    ));
    let mut slow = broker.subscribe("t");
    let mut fast = broker.subscribe("t");

    assert_eq!(broker.publish("t", 1), 2);
    fast.try_recv().unwrap();

    assert_eq!(broker.publish("t", 2), 1);
    assert!(slow.is_cancelled());
    assert_eq!(slow.try_recv(), Err(TryRecvError::Closed));
    assert_eq!(fast.try_recv().unwrap().payload, 2);
    assert_eq!(broker.subscriber_count("t"), 1);

    let m = broker.metrics();
    assert_eq!(m.overflowed, 1);
    assert_eq!(m.active_subscriptions(), 1);
}

/// Тест проверяет параллельных издателей: подписчик видит сообщения
/// каждого издателя в порядке их публикации.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers_preserve_per_publisher_order() {
    let broker = Broker::<(u8, u32)>::new();
    let mut sub = broker.subscribe("t");

    let publishers: Vec<_> = (0..4u8)
        .map(|p| {
            let broker = broker.clone();
            tokio::spawn(async move {
                for i in 0..250 {
                    broker.publish("t", (p, i));
                }
            })
        })
        .collect();
    for p in publishers {
        p.await.unwrap();
    }

    let mut last = [None::<u32>; 4];
    let mut total = 0;
    while let Ok(msg) = sub.try_recv() {
        let (p, i) = msg.payload;
        if let Some(prev) = last[p as usize] {
            assert!(i > prev, "publisher {p}: {i} after {prev}");
        }
        last[p as usize] = Some(i);
        total += 1;
    }
    assert_eq!(total, 1000);
}
