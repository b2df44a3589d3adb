use std::sync::Arc;

/// Имя топика. Интернируется брокером, поэтому клонирование дешёвое.
pub type Topic = Arc<str>;

/// Сообщение, доставленное подписчику.
///
/// Несёт топик, из которого пришёл `payload`: у подписки на несколько
/// топиков это единственный способ различить источник.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<P> {
    pub topic: Topic,
    pub payload: P,
}

impl<P> Message<P> {
    pub fn new(
        topic: impl Into<Topic>,
        payload: P,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Имя топика как `&str`.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Забирает полезную нагрузку, отбрасывая топик.
    pub fn into_payload(self) -> P {
        self.payload
    }
}
