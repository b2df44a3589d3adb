use parking_lot::RwLock;

use super::NewsEvent;

/// Хранилище новостных событий в памяти.
///
/// Порядок событий совпадает с порядком добавления.
#[derive(Debug, Default)]
pub struct EventStore {
    events: RwLock<Vec<NewsEvent>>,
}

impl EventStore {
    /// Пустое хранилище.
    pub fn new() -> Self {
        Self::default()
    }

    /// Хранилище с демонстрационным событием "Harry Potter" / "Hogwarts".
    pub fn seeded() -> Self {
        Self::from_events(vec![NewsEvent::new("Harry Potter", "Hogwarts")])
    }

    pub fn from_events(events: Vec<NewsEvent>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    /// Копия всех событий.
    pub fn all(&self) -> Vec<NewsEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Добавляет событие и вызывает `after` с полным списком, пока держит
    /// блокировку записи.
    ///
    /// `after` не должен ждать и не должен обращаться к хранилищу.
    pub fn push_with<R>(
        &self,
        event: NewsEvent,
        after: impl FnOnce(&[NewsEvent]) -> R,
    ) -> R {
        let mut events = self.events.write();
        events.push(event);
        after(&events)
    }

    pub fn push(
        &self,
        event: NewsEvent,
    ) {
        self.push_with(event, |_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_store() {
        let store = EventStore::seeded();
        assert_eq!(store.all(), vec![NewsEvent::new("Harry Potter", "Hogwarts")]);
    }

    #[test]
    fn test_push_preserves_order() {
        let store = EventStore::new();
        assert!(store.is_empty());

        store.push(NewsEvent::new("1", "a"));
        store.push(NewsEvent::new("2", "b"));

        let titles: Vec<_> = store.all().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["1", "2"]);
    }

    /// Тест проверяет, что `push_with` видит только что добавленное событие.
    #[test]
    fn test_push_with_sees_new_event() {
        let store = EventStore::seeded();
        let seen = store.push_with(NewsEvent::new("A", "B"), |events| events.len());
        assert_eq!(seen, 2);
        assert_eq!(store.len(), 2);
    }
}
