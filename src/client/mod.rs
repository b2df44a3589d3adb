//! Клиент newsbus: `ClientConnection` обменивается кадрами, `NewsClient`
//! даёт запросы, мутации и подписки поверх него.

pub mod connection;
pub mod core;

use crate::ClientError;

/// Результат операций клиента.
pub type ClientResult<T> = Result<T, ClientError>;

// Публичный экспорт всех типов ошибок и функций из вложенных
// модулей, чтобы упростить доступ к ним из внешнего кода.
pub use self::core::*;

pub use connection::*;
