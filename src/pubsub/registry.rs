use std::{collections::BTreeMap, sync::Arc};

use dashmap::DashMap;

use super::{
    channel::{ChannelId, ChannelShared, PushOutcome},
    Message, Topic,
};

/// Итог одной рассылки.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FanoutReport {
    /// Каналы, в очередь которых попало сообщение
    pub delivered: usize,
    /// Вытеснено старых сообщений (`DropOldest`)
    pub evicted: usize,
    /// Отброшено новых сообщений (`DropNewest`)
    pub rejected: usize,
    /// Каналы, отменённые из-за переполнения (`Cancel`)
    pub overflowed: usize,
    /// Сообщений, потерянных вместе с отменёнными каналами
    pub discarded: usize,
}

/// Реестр топиков: имя топика → активные каналы.
///
/// Каждая запись хранит только членство. Пустые записи удаляются сразу,
/// поэтому число записей равно числу топиков хотя бы с одним подписчиком.
pub(crate) struct TopicRegistry<P> {
    topics: DashMap<Topic, BTreeMap<ChannelId, Arc<ChannelShared<P>>>>,
}

impl<P> TopicRegistry<P> {
    pub(crate) fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Регистрирует канал под топиком. Повторная регистрация ничего не меняет.
    pub(crate) fn register(
        &self,
        topic: &Topic,
        channel: &Arc<ChannelShared<P>>,
    ) -> bool {
        self.topics
            .entry(topic.clone())
            .or_default()
            .insert(channel.id(), channel.clone())
            .is_none()
    }

    /// Снимает канал с топика и удаляет опустевшую запись.
    pub(crate) fn unregister(
        &self,
        topic: &str,
        id: ChannelId,
    ) -> bool {
        let removed = match self.topics.get_mut(topic) {
            Some(mut members) => members.remove(&id).is_some(),
            None => false,
        };
        // Шард уже отпущен: remove_if берёт его заново.
        self.topics.remove_if(topic, |_, members| members.is_empty());
        removed
    }

    /// Снимает канал со всех его топиков.
    pub(crate) fn detach(
        &self,
        channel: &ChannelShared<P>,
    ) {
        for topic in channel.topics() {
            self.unregister(topic, channel.id());
        }
    }

    /// Копия членства топика на момент вызова.
    fn snapshot(
        &self,
        topic: &str,
    ) -> Option<(Topic, Vec<Arc<ChannelShared<P>>>)> {
        let entry = self.topics.get(topic)?;
        Some((entry.key().clone(), entry.value().values().cloned().collect()))
    }

    pub(crate) fn subscriber_count(
        &self,
        topic: &str,
    ) -> usize {
        self.topics.get(topic).map_or(0, |members| members.len())
    }

    pub(crate) fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.topics.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    pub(crate) fn contains(
        &self,
        topic: &str,
    ) -> bool {
        self.topics.contains_key(topic)
    }
}

impl<P: Clone> TopicRegistry<P> {
    /// Доставляет `payload` всем каналам, зарегистрированным под `topic` в
    /// момент вызова.
    ///
    /// Блокировка шарда держится только на время снятия снимка; сама доставка
    /// идёт без неё. Каналы, отменённые политикой `Cancel`, снимаются с
    /// реестра здесь же.
    pub(crate) fn fanout(
        &self,
        topic: &str,
        payload: P,
    ) -> FanoutReport {
        let mut report = FanoutReport::default();
        let Some((topic, targets)) = self.snapshot(topic) else {
            return report;
        };

        let mut payload = Some(payload);
        let last = targets.len().saturating_sub(1);
        for (i, channel) in targets.iter().enumerate() {
            // Последний получатель забирает payload без клонирования.
            let payload = if i == last {
                payload.take()
            } else {
                payload.clone()
            };
            let Some(payload) = payload else {
                break;
            };

            let outcome = channel.push(Message::new(topic.clone(), payload));
            if outcome.is_delivered() {
                report.delivered += 1;
            }
            match outcome {
                PushOutcome::Evicted => report.evicted += 1,
                PushOutcome::Rejected => report.rejected += 1,
                PushOutcome::Overflowed { discarded } => {
                    report.overflowed += 1;
                    report.discarded += discarded;
                    self.detach(channel);
                    tracing::warn!(
                        topic = %topic,
                        channel_id = channel.id(),
                        discarded,
                        "Subscriber queue overflowed, subscription cancelled"
                    );
                }
                PushOutcome::Queued | PushOutcome::Closed => {}
            }
        }

        report
    }
}
