use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки сетевого подключения и передачи данных.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Не удалось подключиться
    #[error("failed to connect to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },
    /// Соединение закрыто
    #[error("connection closed{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    ConnectionClosed { reason: Option<String> },
    /// Таймаут чтения
    #[error("read timeout")]
    ReadTimeout,
    /// Таймаут записи
    #[error("write timeout")]
    WriteTimeout,
    /// Превышен общий лимит соединений
    #[error("too many connections: {current}/{max}")]
    TooManyConnections { current: usize, max: usize },
    /// Превышен лимит соединений с одного IP
    #[error("too many connections from {ip}: limit {max}")]
    TooManyConnectionsFromIp { ip: String, max: usize },
    /// Ошибка ввода-вывода
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for NetworkError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ConnectionFailed { .. } => StatusCode::ConnectionFailed,
            Self::ConnectionClosed { .. } => StatusCode::ConnectionClosed,
            Self::ReadTimeout => StatusCode::ReadTimeout,
            Self::WriteTimeout => StatusCode::WriteTimeout,
            Self::TooManyConnections { .. } | Self::TooManyConnectionsFromIp { .. } => {
                StatusCode::TooManyConnections
            }
            Self::Io(err) => match err.kind() {
                std::io::ErrorKind::TimedOut => StatusCode::Timeout,
                std::io::ErrorKind::UnexpectedEof => StatusCode::UnexpectedEof,
                std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted => StatusCode::ConnectionFailed,
                _ => StatusCode::Io,
            },
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
