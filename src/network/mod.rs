//! Сетевой модуль newsbus.
//!
//! ## Подмодули
//!
//! - `banner`: баннер и лог запуска сервера.
//! - `protocol`: JSON-кадры клиента и сервера, построчное чтение кадров.
//! - `connection`: лимиты соединений, обработка кадров и подписок одного
//!   клиента, graceful shutdown.
//! - `server`: приём соединений и остановка сервера.

pub mod banner;
pub mod connection;
pub mod protocol;
pub mod server;

pub use connection::{ConnectionConfig, ConnectionManager};
pub use protocol::{ClientFrame, ServerFrame, MAX_FRAME_LEN};
