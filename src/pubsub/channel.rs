use std::{collections::VecDeque, mem, num::NonZeroUsize};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use super::{Message, Topic};
use crate::TryRecvError;

/// Идентификатор канала подписчика. Уникален в пределах одного брокера.
pub type ChannelId = u64;

/// Что делать, когда ограниченная очередь подписчика заполнена.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Вытеснить самое старое сообщение
    #[default]
    DropOldest,
    /// Отбросить новое сообщение
    DropNewest,
    /// Отменить подписку целиком
    Cancel,
}

/// Параметры очереди, с которыми брокер создаёт каналы.
///
/// По умолчанию очередь не ограничена и `overflow` не используется.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelConfig {
    pub capacity: Option<NonZeroUsize>,
    pub overflow: OverflowPolicy,
}

impl ChannelConfig {
    /// Неограниченная очередь.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Очередь не длиннее `capacity` сообщений.
    pub fn bounded(
        capacity: NonZeroUsize,
        overflow: OverflowPolicy,
    ) -> Self {
        Self {
            capacity: Some(capacity),
            overflow,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.capacity.is_some()
    }
}

/// Состояние канала. `Cancelled` терминально.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Active,
    Cancelled,
}

/// Результат постановки сообщения в очередь канала.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    /// Сообщение добавлено в хвост
    Queued,
    /// Сообщение добавлено, самое старое вытеснено
    Evicted,
    /// Очередь заполнена, сообщение отброшено
    Rejected,
    /// Очередь заполнена, канал отменён политикой `Cancel`
    Overflowed { discarded: usize },
    /// Канал уже отменён
    Closed,
}

impl PushOutcome {
    /// Попало ли сообщение в очередь.
    pub(crate) fn is_delivered(self) -> bool {
        matches!(self, Self::Queued | Self::Evicted)
    }
}

struct Inner<P> {
    queue: VecDeque<Message<P>>,
    state: ChannelState,
}

/// Разделяемая часть канала подписчика.
///
/// Реестр топиков держит на неё `Arc` только как членство; читать очередь
/// может лишь владелец [`Subscription`](super::Subscription).
pub(crate) struct ChannelShared<P> {
    id: ChannelId,
    topics: Box<[Topic]>,
    config: ChannelConfig,
    inner: Mutex<Inner<P>>,
    notify: Notify,
}

impl<P> ChannelShared<P> {
    pub(crate) fn new(
        id: ChannelId,
        topics: Vec<Topic>,
        config: ChannelConfig,
    ) -> Self {
        Self {
            id,
            topics: topics.into_boxed_slice(),
            config,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                state: ChannelState::Active,
            }),
            notify: Notify::new(),
        }
    }

    pub(crate) fn id(&self) -> ChannelId {
        self.id
    }

    /// Топики, под которыми канал зарегистрирован (без повторов).
    pub(crate) fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub(crate) fn state(&self) -> ChannelState {
        self.inner.lock().state
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Кладёт сообщение в хвост очереди. Никогда не блокирует продюсера.
    ///
    /// Отменённый канал молча отбрасывает сообщение.
    pub(crate) fn push(
        &self,
        message: Message<P>,
    ) -> PushOutcome {
        let (outcome, discarded) = {
            let mut inner = self.inner.lock();
            if inner.state == ChannelState::Cancelled {
                return PushOutcome::Closed;
            }

            match self.config.capacity {
                Some(cap) if inner.queue.len() >= cap.get() => match self.config.overflow {
                    OverflowPolicy::DropOldest => {
                        let evicted = inner.queue.pop_front();
                        inner.queue.push_back(message);
                        (PushOutcome::Evicted, evicted.into_iter().collect())
                    }
                    OverflowPolicy::DropNewest => return PushOutcome::Rejected,
                    OverflowPolicy::Cancel => {
                        inner.state = ChannelState::Cancelled;
                        let drained: VecDeque<_> = mem::take(&mut inner.queue);
                        (
                            PushOutcome::Overflowed {
                                discarded: drained.len(),
                            },
                            drained,
                        )
                    }
                },
                _ => {
                    inner.queue.push_back(message);
                    (PushOutcome::Queued, VecDeque::new())
                }
            }
        };

        // Вытесненные payload освобождаются вне блокировки.
        drop(discarded);
        self.notify.notify_one();
        outcome
    }

    /// Забирает голову очереди без ожидания.
    pub(crate) fn try_pop(&self) -> Result<Message<P>, TryRecvError> {
        let mut inner = self.inner.lock();
        match inner.queue.pop_front() {
            Some(message) => Ok(message),
            None if inner.state == ChannelState::Cancelled => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Ждёт следующего сообщения. `None` означает, что канал отменён.
    pub(crate) async fn pop(&self) -> Option<Message<P>> {
        loop {
            // `notified()` создаётся до проверки очереди, иначе push между
            // проверкой и ожиданием потеряет пробуждение.
            let notified = self.notify.notified();
            match self.try_pop() {
                Ok(message) => return Some(message),
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => {}
            }
            notified.await;
        }
    }

    /// Переводит канал в `Cancelled` и очищает очередь.
    ///
    /// Возвращает число отброшенных сообщений или `None`, если канал уже был
    /// отменён.
    pub(crate) fn close(&self) -> Option<usize> {
        let drained = {
            let mut inner = self.inner.lock();
            if inner.state == ChannelState::Cancelled {
                return None;
            }
            inner.state = ChannelState::Cancelled;
            mem::take(&mut inner.queue)
        };

        let discarded = drained.len();
        drop(drained);
        self.notify.notify_one();
        Some(discarded)
    }
}
