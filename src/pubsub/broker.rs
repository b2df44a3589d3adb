use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use super::{
    channel::{ChannelConfig, ChannelShared},
    intern_topic,
    metrics::{BrokerMetrics, BrokerMetricsSnapshot},
    registry::TopicRegistry,
    Subscription, Topic,
};

/// Брокер широковещательной рассылки по топикам.
///
/// Поддерживает:
/// - Независимые очереди для каждого подписчика (broadcast-семантика)
/// - Подписку одной очередью на несколько топиков
/// - Автоматическое удаление пустых топиков
/// - Ограниченные очереди с политикой переполнения
/// - Счётчики публикаций и доставок
///
/// `Broker` дешёво клонируется: все клоны разделяют один реестр.
pub struct Broker<P> {
    registry: Arc<TopicRegistry<P>>,
    metrics: Arc<BrokerMetrics>,
    next_id: Arc<AtomicU64>,
    config: ChannelConfig,
}

impl<P: Clone + Send + 'static> Broker<P> {
    /// Создаёт брокер с неограниченными очередями подписчиков.
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::unbounded())
    }

    /// Создаёт брокер, каналы которого используют `config`.
    pub fn with_config(config: ChannelConfig) -> Self {
        Self {
            registry: Arc::new(TopicRegistry::new()),
            metrics: Arc::new(BrokerMetrics::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            config,
        }
    }

    pub fn config(&self) -> ChannelConfig {
        self.config
    }

    /// Публикует `payload` всем текущим подписчикам `topic`.
    ///
    /// Возвращает число подписчиков, в очередь которых попало сообщение.
    /// Публикация в топик без подписчиков ничего не делает и не создаёт
    /// запись в реестре.
    pub fn publish(
        &self,
        topic: &str,
        payload: P,
    ) -> usize {
        let report = self.registry.fanout(topic, payload);
        self.metrics.record_publish(&report);
        tracing::trace!(
            topic,
            delivered = report.delivered,
            evicted = report.evicted,
            rejected = report.rejected,
            "Published message"
        );
        report.delivered
    }

    /// Подписка на один топик.
    pub fn subscribe(
        &self,
        topic: &str,
    ) -> Subscription<P> {
        self.subscribe_many([topic])
    }

    /// Подписка одной очередью на несколько топиков.
    ///
    /// Сообщения всех топиков сливаются в порядке поступления. Повторы в
    /// `topics` регистрируются один раз. Подписка без топиков ничего не
    /// получит до отмены.
    pub fn subscribe_many<I, S>(
        &self,
        topics: I,
    ) -> Subscription<P>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<Topic> = Vec::new();
        for topic in topics {
            let topic = intern_topic(topic);
            if !unique.contains(&topic) {
                unique.push(topic);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(ChannelShared::new(id, unique, self.config));
        for topic in shared.topics() {
            self.registry.register(topic, &shared);
        }
        self.metrics.record_subscribe();

        tracing::debug!(
            channel_id = id,
            topics = ?shared.topics(),
            "Subscription created"
        );

        Subscription::new(shared, self.registry.clone(), self.metrics.clone())
    }
}

impl<P> Broker<P> {
    /// Количество активных подписчиков топика.
    pub fn subscriber_count(
        &self,
        topic: &str,
    ) -> usize {
        self.registry.subscriber_count(topic)
    }

    /// Топики, у которых есть хотя бы один подписчик, в лексикографическом
    /// порядке.
    pub fn active_topics(&self) -> Vec<Topic> {
        self.registry.topics()
    }

    pub fn metrics(&self) -> BrokerMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl<P> Clone for Broker<P> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            next_id: self.next_id.clone(),
            config: self.config,
        }
    }
}

impl<P: Clone + Send + 'static> Default for Broker<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> std::fmt::Debug for Broker<P> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("config", &self.config)
            .field("topics", &self.registry.topics())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use tokio::time::{timeout, Duration};

    use super::*;
    use crate::pubsub::OverflowPolicy;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let broker = Broker::new();
        let mut sub = broker.subscribe("news");

        assert_eq!(broker.publish("news", "hello".to_string()), 1);

        let msg = timeout(Duration::from_millis(50), sub.recv())
            .await
            .expect("timed out")
            .expect("subscription closed");
        assert_eq!(msg.topic(), "news");
        assert_eq!(msg.payload, "hello");
    }

    /// Тест проверяет, что публикация без подписчиков не создаёт топик.
    #[tokio::test]
    async fn test_publish_to_nonexistent_topic() {
        let broker = Broker::<u32>::new();
        assert_eq!(broker.publish("nobody", 1), 0);
        assert!(broker.active_topics().is_empty());
        assert_eq!(broker.metrics().published, 1);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive() {
        let broker = Broker::new();
        let mut subs = vec![broker.subscribe("t"), broker.subscribe("t")];

        assert_eq!(broker.publish("t", 9u32), 2);

        for sub in subs.iter_mut() {
            let msg = timeout(Duration::from_millis(50), sub.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(msg.payload, 9);
        }
    }

    /// Тест проверяет, что повторяющиеся топики регистрируются один раз и
    /// сообщение приходит один раз.
    #[tokio::test]
    async fn test_subscribe_many_deduplicates() {
        let broker = Broker::new();
        let mut sub = broker.subscribe_many(["a", "a", "b"]);

        assert_eq!(sub.topics().len(), 2);
        assert_eq!(broker.subscriber_count("a"), 1);

        broker.publish("a", 1u32);
        assert_eq!(sub.try_recv().unwrap().payload, 1);
        assert_eq!(sub.try_recv(), Err(crate::TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_cancel_prunes_topics() {
        let broker = Broker::<u32>::new();
        let sub = broker.subscribe_many(["a", "b"]);
        assert_eq!(broker.active_topics().len(), 2);

        sub.cancel();
        sub.cancel();
        assert!(broker.active_topics().is_empty());

        let m = broker.metrics();
        assert_eq!(m.subscriptions_created, 1);
        assert_eq!(m.subscriptions_cancelled, 1);
    }

    #[tokio::test]
    async fn test_clones_share_registry() {
        let broker = Broker::<u32>::new();
        let other = broker.clone();
        let mut sub = other.subscribe("t");

        assert_eq!(broker.publish("t", 3), 1);
        assert_eq!(sub.try_recv().unwrap().payload, 3);
    }

    /// Тест проверяет, что независимые брокеры не видят подписчиков друг
    /// друга.
    #[tokio::test]
    async fn test_independent_brokers() {
        let a = Broker::<u32>::new();
        let b = Broker::<u32>::new();
        let _sub = a.subscribe("t");

        assert_eq!(b.publish("t", 1), 0);
        assert_eq!(a.publish("t", 1), 1);
    }

    #[tokio::test]
    async fn test_bounded_broker_counts_overflow() {
        let cfg = ChannelConfig::bounded(NonZeroUsize::new(1).unwrap(), OverflowPolicy::DropNewest);
        let broker = Broker::with_config(cfg);
        let mut sub = broker.subscribe("t");

        assert_eq!(broker.publish("t", 1u32), 1);
        assert_eq!(broker.publish("t", 2u32), 0);

        assert_eq!(sub.try_recv().unwrap().payload, 1);
        let m = broker.metrics();
        assert_eq!(m.rejected, 1);
        assert_eq!(m.delivered, 1);
    }
}
