//! Подсистема Publish–Subscribe (pub/sub).
//!
//! Широковещательная шина по топикам с отдельной очередью на каждого
//! подписчика:
//!
//! - `broker`: фасад для продюсеров (`publish`) и потребителей
//!   (`subscribe`, `subscribe_many`).
//! - `channel`: очередь подписчика, её состояние и политика переполнения.
//! - `registry` (приватный): топик → множество активных каналов.
//! - `subscriber`: `Subscription` и `CancelHandle` для потребителей.
//! - `message`: сообщение, которое получает подписчик.
//! - `metrics`: счётчики брокера.
//! - `intern` (приватный): пул имён топиков.

pub mod broker;
pub mod channel;
mod intern;
pub mod message;
pub mod metrics;
mod registry;
pub mod subscriber;

// Публичный экспорт всех типов и функций из вложенных модулей, чтобы
// упростить доступ к ним из внешнего кода.
pub use broker::*;
pub use channel::{ChannelConfig, ChannelId, ChannelState, OverflowPolicy};
pub(crate) use intern::intern_topic;
pub use message::*;
pub use metrics::{BrokerMetrics, BrokerMetricsSnapshot};
pub use subscriber::*;
