//! Новостная лента поверх шины pub/sub.
//!
//! - `event`: `NewsEvent`, полезная нагрузка `FeedPayload`, имена топиков и
//!   полей запросов.
//! - `store`: хранилище событий в памяти.
//! - `service`: резолверы `placeholder`, `events`, `createNewsEvent`,
//!   `newsFeed`, `allEvents`.

pub mod event;
pub mod service;
pub mod store;

pub use event::*;
pub use service::NewsService;
pub use store::EventStore;
