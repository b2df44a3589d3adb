use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки клиента newsbus.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Ошибка подключения к серверу
    #[error("failed to connect to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },
    /// Таймаут подключения
    #[error("connection timeout")]
    ConnectionTimeout,
    /// Соединение закрыто сервером
    #[error("connection closed by server")]
    ConnectionClosed,
    /// Сервер ответил кадром `error`
    #[error("server error {code}: {message}")]
    ServerError { code: u32, message: String },
    /// Кадр не того типа, который ожидался
    #[error("unexpected response: expected {expected}, got {got}")]
    UnexpectedResponse { expected: &'static str, got: String },
    /// Не удалось сериализовать запрос
    #[error("encoding error: {reason}")]
    EncodingError { reason: String },
    /// Не удалось разобрать ответ
    #[error("decoding error: {reason}")]
    DecodingError { reason: String },
    /// Таймаут чтения
    #[error("read timeout")]
    ReadTimeout,
    /// Таймаут записи
    #[error("write timeout")]
    WriteTimeout,
    /// Ошибка ввода-вывода
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Статус-код, присланный сервером, если это ошибка сервера.
    pub fn server_status(&self) -> Option<StatusCode> {
        match self {
            Self::ServerError { code, .. } => StatusCode::from_u32(*code),
            _ => None,
        }
    }
}

impl ErrorExt for ClientError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ConnectionFailed { .. } => StatusCode::ConnectionFailed,
            Self::ConnectionTimeout => StatusCode::Timeout,
            Self::ConnectionClosed => StatusCode::ConnectionClosed,
            Self::ServerError { .. } => self.server_status().unwrap_or(StatusCode::Unknown),
            Self::UnexpectedResponse { .. } => StatusCode::ProtocolError,
            Self::EncodingError { .. } => StatusCode::SerializationFailed,
            Self::DecodingError { .. } => StatusCode::DeserializationFailed,
            Self::ReadTimeout => StatusCode::ReadTimeout,
            Self::WriteTimeout => StatusCode::WriteTimeout,
            Self::Io(_) => StatusCode::Io,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    /// Клиентская ошибка и так видна только пользователю клиента.
    fn client_message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_carries_status() {
        let err = ClientError::ServerError {
            code: StatusCode::InvalidCommand.code(),
            message: "unknown query field 'nope'".into(),
        };
        assert_eq!(err.status_code(), StatusCode::InvalidCommand);
        assert_eq!(
            err.to_string(),
            "server error 8001: unknown query field 'nope'"
        );
    }

    #[test]
    fn test_unknown_server_code() {
        let err = ClientError::ServerError {
            code: 424242,
            message: "?".into(),
        };
        assert_eq!(err.server_status(), None);
        assert_eq!(err.status_code(), StatusCode::Unknown);
    }

    /// Тест проверяет, что клиент видит полный текст даже для внутренних
    /// ошибок.
    #[test]
    fn test_client_message_is_full_text() {
        let err = ClientError::ServerError {
            code: StatusCode::Internal.code(),
            message: "Internal server error".into(),
        };
        assert_eq!(err.client_message(), err.to_string());
    }
}
