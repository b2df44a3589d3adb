use std::sync::Arc;

use serde_json::{Map, Value};

use super::{
    EventStore, FeedPayload, NewsEvent, QueryField, SubscriptionField, EVENT_CREATED,
    FETCH_EVENTS,
};
use crate::pubsub::{Broker, ChannelConfig, Subscription};

/// Резолверы новостной ленты.
///
/// Владеет хранилищем событий и брокером; клоны разделяют оба.
#[derive(Debug, Clone)]
pub struct NewsService {
    store: Arc<EventStore>,
    broker: Broker<FeedPayload>,
}

impl NewsService {
    pub fn new(
        store: EventStore,
        broker: Broker<FeedPayload>,
    ) -> Self {
        Self {
            store: Arc::new(store),
            broker,
        }
    }

    /// Сервис с демонстрационным событием и очередями по `config`.
    pub fn seeded(config: ChannelConfig) -> Self {
        Self::new(EventStore::seeded(), Broker::with_config(config))
    }

    pub fn broker(&self) -> &Broker<FeedPayload> {
        &self.broker
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Заглушка `placeholder`: всегда `true`.
    pub fn placeholder(&self) -> bool {
        true
    }

    /// Все события в порядке добавления.
    pub fn events(&self) -> Vec<NewsEvent> {
        self.store.all()
    }

    /// Добавляет событие и оповещает подписчиков.
    ///
    /// Сначала публикуется `newsFeed` в [`EVENT_CREATED`], затем полный список
    /// в [`FETCH_EVENTS`]. Публикация идёт под блокировкой хранилища, поэтому
    /// списки `allEvents` приходят подписчикам в порядке изменений.
    pub fn create_news_event(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> NewsEvent {
        let event = NewsEvent::new(title, description);
        tracing::info!(
            title = %event.title,
            description = %event.description,
            "Creating news event"
        );

        let (feed, all) = self.store.push_with(event.clone(), |events| {
            let feed = self
                .broker
                .publish(EVENT_CREATED, FeedPayload::NewsFeed(event.clone()));
            let all = self
                .broker
                .publish(FETCH_EVENTS, FeedPayload::AllEvents(events.to_vec()));
            (feed, all)
        });

        tracing::debug!(
            news_feed_subscribers = feed,
            all_events_subscribers = all,
            total_events = self.store.len(),
            "News event published"
        );
        event
    }

    /// Подписка на одно или несколько полей одной очередью.
    pub fn subscribe(
        &self,
        fields: &[SubscriptionField],
    ) -> Subscription<FeedPayload> {
        self.broker
            .subscribe_many(fields.iter().map(|field| field.topic()))
    }

    /// Подписка `newsFeed`.
    pub fn news_feed(&self) -> Subscription<FeedPayload> {
        self.subscribe(&[SubscriptionField::NewsFeed])
    }

    /// Подписка `allEvents`.
    pub fn all_events(&self) -> Subscription<FeedPayload> {
        self.subscribe(&[SubscriptionField::AllEvents])
    }

    /// Выполняет запрос и возвращает объект `{<field>: value}`.
    pub fn query(
        &self,
        field: QueryField,
    ) -> serde_json::Result<Value> {
        let value = match field {
            QueryField::Placeholder => Value::Bool(self.placeholder()),
            QueryField::Events => serde_json::to_value(self.events())?,
        };
        Ok(single_field(field.as_ref(), value))
    }
}

/// Объект с единственным полем.
pub(crate) fn single_field(
    name: &str,
    value: Value,
) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(name.to_string(), value);
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::timeout;

    use super::*;

    fn service() -> NewsService {
        NewsService::seeded(ChannelConfig::unbounded())
    }

    #[test]
    fn test_placeholder_and_events_queries() {
        let svc = service();
        assert_eq!(
            svc.query(QueryField::Placeholder).unwrap(),
            json!({"placeholder": true})
        );
        assert_eq!(
            svc.query(QueryField::Events).unwrap(),
            json!({"events": [{"title": "Harry Potter", "description": "Hogwarts"}]})
        );
    }

    /// Тест проверяет, что мутация без подписчиков только меняет хранилище.
    #[test]
    fn test_create_without_subscribers() {
        let svc = service();
        let ev = svc.create_news_event("A", "B");

        assert_eq!(ev, NewsEvent::new("A", "B"));
        assert_eq!(svc.events().len(), 2);
        assert!(svc.broker().active_topics().is_empty());
    }

    /// Тест проверяет порядок публикаций: сначала `newsFeed`, затем
    /// `allEvents` с уже добавленным событием.
    #[tokio::test]
    async fn test_create_publishes_feed_then_all_events() {
        let svc = service();
        let mut sub = svc.subscribe(&[SubscriptionField::NewsFeed, SubscriptionField::AllEvents]);

        svc.create_news_event("A", "B");

        let first = timeout(Duration::from_millis(100), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.topic(), EVENT_CREATED);
        assert_eq!(first.payload, FeedPayload::NewsFeed(NewsEvent::new("A", "B")));

        let second = timeout(Duration::from_millis(100), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.topic(), FETCH_EVENTS);
        match second.payload {
            FeedPayload::AllEvents(events) => {
                assert_eq!(events.len(), 2);
                assert_eq!(events[1], NewsEvent::new("A", "B"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_news_feed_ignores_all_events() {
        let svc = service();
        let mut feed = svc.news_feed();

        svc.create_news_event("x", "y");

        assert!(feed.try_recv().is_ok());
        assert_eq!(feed.try_recv(), Err(crate::TryRecvError::Empty));
    }

    #[test]
    fn test_clones_share_store() {
        let svc = service();
        let other = svc.clone();
        other.create_news_event("t", "d");
        assert_eq!(svc.events().len(), 2);
    }
}
