use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};

/// Топик, в который публикуется каждое созданное событие.
pub const EVENT_CREATED: &str = "EVENT_CREATED";
/// Топик, в который публикуется полный список событий после изменения.
pub const FETCH_EVENTS: &str = "FETCH_EVENTS";

/// Новостное событие.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsEvent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl NewsEvent {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Полезная нагрузка шины новостей.
///
/// Оба топика используют один тип, поэтому одна подписка может слушать их
/// одновременно. Сериализуется как `{"newsFeed": {...}}` или
/// `{"allEvents": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedPayload {
    #[serde(rename = "newsFeed")]
    NewsFeed(NewsEvent),
    #[serde(rename = "allEvents")]
    AllEvents(Vec<NewsEvent>),
}

impl FeedPayload {
    /// Поле подписки, которому соответствует нагрузка.
    pub fn field(&self) -> SubscriptionField {
        match self {
            Self::NewsFeed(_) => SubscriptionField::NewsFeed,
            Self::AllEvents(_) => SubscriptionField::AllEvents,
        }
    }
}

/// Поля запросов (`query`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, EnumIter)]
pub enum QueryField {
    #[strum(serialize = "placeholder")]
    Placeholder,
    #[strum(serialize = "events")]
    Events,
}

/// Поля мутаций (`mutation`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, EnumIter)]
pub enum MutationField {
    #[strum(serialize = "createNewsEvent")]
    CreateNewsEvent,
}

/// Поля подписок (`subscribe`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, EnumIter)]
pub enum SubscriptionField {
    #[strum(serialize = "newsFeed")]
    NewsFeed,
    #[strum(serialize = "allEvents")]
    AllEvents,
}

impl SubscriptionField {
    /// Топик шины, который слушает поле.
    pub fn topic(self) -> &'static str {
        match self {
            Self::NewsFeed => EVENT_CREATED,
            Self::AllEvents => FETCH_EVENTS,
        }
    }
}
