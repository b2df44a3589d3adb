use std::sync::atomic::{AtomicU64, Ordering};

use super::registry::FanoutReport;

/// Счётчики брокера. Обновляются без блокировок.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    published: AtomicU64,
    delivered: AtomicU64,
    evicted: AtomicU64,
    rejected: AtomicU64,
    overflowed: AtomicU64,
    discarded: AtomicU64,
    subscriptions_created: AtomicU64,
    subscriptions_cancelled: AtomicU64,
}

/// Снимок счётчиков на момент вызова [`Broker::metrics`](super::Broker::metrics).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BrokerMetricsSnapshot {
    /// Вызовов `publish`
    pub published: u64,
    /// Сообщений, поставленных в очереди подписчиков
    pub delivered: u64,
    /// Старых сообщений, вытесненных при переполнении
    pub evicted: u64,
    /// Новых сообщений, отброшенных при переполнении
    pub rejected: u64,
    /// Подписок, отменённых из-за переполнения
    pub overflowed: u64,
    /// Сообщений, выброшенных из очередей при отмене подписок
    pub discarded: u64,
    pub subscriptions_created: u64,
    pub subscriptions_cancelled: u64,
}

impl BrokerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_publish(
        &self,
        report: &FanoutReport,
    ) {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.evicted
            .fetch_add(report.evicted as u64, Ordering::Relaxed);
        self.rejected
            .fetch_add(report.rejected as u64, Ordering::Relaxed);
        if report.overflowed > 0 {
            self.overflowed
                .fetch_add(report.overflowed as u64, Ordering::Relaxed);
            self.subscriptions_cancelled
                .fetch_add(report.overflowed as u64, Ordering::Relaxed);
            self.discarded
                .fetch_add(report.discarded as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_subscribe(&self) {
        self.subscriptions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancel(
        &self,
        discarded: usize,
    ) {
        self.subscriptions_cancelled.fetch_add(1, Ordering::Relaxed);
        self.discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BrokerMetricsSnapshot {
        BrokerMetricsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            subscriptions_created: self.subscriptions_created.load(Ordering::Relaxed),
            subscriptions_cancelled: self.subscriptions_cancelled.load(Ordering::Relaxed),
        }
    }
}

impl BrokerMetricsSnapshot {
    /// Подписки, которые ещё не отменены.
    pub fn active_subscriptions(&self) -> u64 {
        self.subscriptions_created
            .saturating_sub(self.subscriptions_cancelled)
    }

    /// Сообщения, не дошедшие до подписчиков из-за ограниченных очередей.
    pub fn dropped(&self) -> u64 {
        self.evicted + self.rejected + self.discarded
    }
}
