use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки разбора и обработки кадров протокола.
///
/// Ни одна из них не закрывает соединение: сервер отвечает кадром `error`
/// и продолжает читать.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Строка не является корректным JSON-кадром
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },
    /// Кадр не является корректной UTF-8 строкой
    #[error("frame is not valid UTF-8: {reason}")]
    InvalidUtf8 { reason: String },
    /// Кадр длиннее допустимого
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
    /// Неизвестное поле запроса
    #[error("unknown {kind} field '{field}'")]
    UnknownField { kind: &'static str, field: String },
    /// Подписка без полей
    #[error("subscription '{id}' names no fields")]
    EmptySubscription { id: String },
    /// Повторное использование id активной подписки
    #[error("subscription id '{id}' is already in use")]
    DuplicateSubscription { id: String },
    /// `complete` для неизвестной подписки
    #[error("no active subscription with id '{id}'")]
    UnknownSubscription { id: String },
    /// Ответ не удалось сериализовать
    #[error("failed to encode frame: {reason}")]
    EncodeFailed { reason: String },
}

impl ErrorExt for ProtocolError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedFrame { .. } => StatusCode::InvalidFrame,
            Self::InvalidUtf8 { .. } => StatusCode::InvalidUtf8,
            Self::FrameTooLarge { .. } => StatusCode::SizeLimit,
            Self::UnknownField { .. } => StatusCode::InvalidCommand,
            Self::EmptySubscription { .. } => StatusCode::InvalidArgs,
            Self::DuplicateSubscription { .. } => StatusCode::AlreadyExists,
            Self::UnknownSubscription { .. } => StatusCode::NotFound,
            Self::EncodeFailed { .. } => StatusCode::SerializationFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "protocol".to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        if let Self::UnknownField { kind, .. } = self {
            tags.push(("field_kind", kind.to_string()));
        }
        tags
    }
}
