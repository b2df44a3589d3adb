use std::{fmt, sync::Arc};

use futures::Stream;

use super::{
    channel::{ChannelId, ChannelShared, ChannelState},
    metrics::BrokerMetrics,
    registry::TopicRegistry,
    Message, Topic,
};
use crate::TryRecvError;

/// Подписка на один или несколько топиков.
///
/// Владеет собственной очередью сообщений: каждый подписчик получает каждое
/// сообщение своих топиков в порядке публикации. Сообщения, опубликованные
/// до создания подписки, не доставляются.
///
/// Отписка происходит автоматически при `Drop`.
pub struct Subscription<P> {
    shared: Arc<ChannelShared<P>>,
    registry: Arc<TopicRegistry<P>>,
    metrics: Arc<BrokerMetrics>,
}

/// Клонируемый дескриптор для отмены подписки из другой задачи.
///
/// Нужен, когда саму подписку забрала задача, которая её читает.
pub struct CancelHandle<P> {
    shared: Arc<ChannelShared<P>>,
    registry: Arc<TopicRegistry<P>>,
    metrics: Arc<BrokerMetrics>,
}

fn cancel_channel<P>(
    shared: &ChannelShared<P>,
    registry: &TopicRegistry<P>,
    metrics: &BrokerMetrics,
) {
    let Some(discarded) = shared.close() else {
        return;
    };
    registry.detach(shared);
    metrics.record_cancel(discarded);
    tracing::debug!(
        channel_id = shared.id(),
        topics = ?shared.topics(),
        discarded,
        "Subscription cancelled"
    );
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<P> Subscription<P> {
    pub(crate) fn new(
        shared: Arc<ChannelShared<P>>,
        registry: Arc<TopicRegistry<P>>,
        metrics: Arc<BrokerMetrics>,
    ) -> Self {
        Self {
            shared,
            registry,
            metrics,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.shared.id()
    }

    /// Топики подписки в порядке, в котором они были переданы (без повторов).
    pub fn topics(&self) -> &[Topic] {
        self.shared.topics()
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == ChannelState::Cancelled
    }

    /// Количество сообщений, ожидающих чтения.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Асинхронно ожидает следующее сообщение.
    ///
    /// # Возвращает
    /// - `Some(Message)` в порядке публикации
    /// - `None` после отмены подписки (конец последовательности)
    pub async fn recv(&mut self) -> Option<Message<P>> {
        self.shared.pop().await
    }

    /// Пытается получить сообщение без ожидания.
    ///
    /// # Возвращает
    /// - `Ok(Message)` если сообщение доступно немедленно
    /// - `Err(TryRecvError::Empty)` если очередь пуста
    /// - `Err(TryRecvError::Closed)` если подписка отменена
    pub fn try_recv(&mut self) -> Result<Message<P>, TryRecvError> {
        self.shared.try_pop()
    }

    /// Отменяет подписку: снимает её со всех топиков и очищает очередь.
    ///
    /// Ожидающий `recv` возвращает `None`. Повторный вызов ничего не делает.
    pub fn cancel(&self) {
        cancel_channel(&self.shared, &self.registry, &self.metrics);
    }

    /// Дескриптор для отмены этой подписки из другой задачи.
    pub fn cancel_handle(&self) -> CancelHandle<P> {
        CancelHandle {
            shared: self.shared.clone(),
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<P: Send + 'static> Subscription<P> {
    /// Превращает подписку в `Stream`, который завершается после отмены.
    ///
    /// Подписка отменяется, когда поток уничтожен.
    pub fn into_stream(self) -> impl Stream<Item = Message<P>> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            let message = sub.recv().await?;
            Some((message, sub))
        })
    }
}

impl<P> CancelHandle<P> {
    pub fn cancel(&self) {
        cancel_channel(&self.shared, &self.registry, &self.metrics);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.state() == ChannelState::Cancelled
    }

    pub fn id(&self) -> ChannelId {
        self.shared.id()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl<P> Drop for Subscription<P> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<P> Clone for CancelHandle<P> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<P> fmt::Debug for Subscription<P> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id())
            .field("topics", &self.topics())
            .field("state", &self.state())
            .finish()
    }
}

impl<P> fmt::Debug for CancelHandle<P> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("id", &self.id())
            .finish()
    }
}
