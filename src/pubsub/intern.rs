use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Пул для повторного использования `Arc<str>` по одинаковым именам топиков.
/// Crate-private: другие модули внутри этого крейта видят, а внешние — нет.
static TOPIC_INTERN: Lazy<DashMap<Box<str>, Arc<str>>> = Lazy::new(DashMap::new);

/// Возвращает interned `Arc<str>` для данного топика.
///
/// При первом вызове для нового имени создаёт `Arc<str>` и сохраняет его в
/// пуле. Пул только растёт: имена топиков в приложении — небольшой
/// фиксированный набор.
#[inline]
pub(crate) fn intern_topic<S: AsRef<str>>(topic: S) -> Arc<str> {
    let key = topic.as_ref();
    if let Some(existing) = TOPIC_INTERN.get(key) {
        return existing.clone();
    }
    TOPIC_INTERN
        .entry(Box::from(key))
        .or_insert_with(|| Arc::from(key))
        .clone()
}
