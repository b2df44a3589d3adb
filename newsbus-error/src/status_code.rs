use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки данных
/// - 4xxx: Ограничения (соединения)
/// - 5xxx: Сериализация
/// - 6xxx: Сеть / IO
/// - 8xxx: Протокольные ошибки
///
/// Числовое значение уходит клиенту в кадре `error`, поэтому варианты
/// нельзя перенумеровывать.
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,
    InvalidConfig = 1005,

    // === 2xxx: Ошибки данных ===
    NotFound = 2000,
    AlreadyExists = 2001,

    // === 4xxx: Ограничения ===
    TooManyConnections = 4002,

    // === 5xxx: Сериализация ===
    SerializationFailed = 5003,
    DeserializationFailed = 5004,

    // === 6xxx: Сеть/IO ===
    Io = 6000,
    ConnectionClosed = 6001,
    Timeout = 6002,
    ProtocolError = 6003,
    ConnectionFailed = 6004,
    ReadTimeout = 6005,
    WriteTimeout = 6006,
    UnexpectedEof = 6007,

    // === 8xxx: Протокол ===
    InvalidFrame = 8000,
    InvalidCommand = 8001,
    InvalidUtf8 = 8004,
    SizeLimit = 8007,
}

/// Рекомендуемый уровень логирования для ошибки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    ///
    /// Возвращает `None`, если значение не соответствует ни одному варианту.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Возвращает `true`, если операцию с этим кодом имеет смысл повторить.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::ReadTimeout
                | Self::WriteTimeout
                | Self::TooManyConnections
                | Self::ConnectionFailed
        )
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Является ли код ошибкой со стороны клиента.
    ///
    /// Диапазоны `2xxx..4xxx`, диапазон `8xxx` и `InvalidArgs`.
    pub fn is_client_error(&self) -> bool {
        let c = self.code();
        if (2000..=4999).contains(&c) || self.is_protocol_error() {
            return true;
        }
        matches!(self, Self::InvalidArgs)
    }

    /// Является ли код ошибкой сервера (`1xxx`, `5xxx..7xxx`).
    pub fn is_server_error(&self) -> bool {
        if matches!(self, Self::InvalidArgs) {
            return false;
        }
        matches!(self.code(), 1000..=1999 | 5000..=7999)
    }

    /// Ошибка протокола или парсинга (диапазон 8xxx).
    pub fn is_protocol_error(&self) -> bool {
        (8000..=8999).contains(&self.code())
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::NotFound | Self::AlreadyExists => LogLevel::Debug,
            Self::InvalidArgs
            | Self::InvalidFrame
            | Self::InvalidCommand
            | Self::InvalidUtf8 => LogLevel::Info,
            Self::Timeout
            | Self::ConnectionClosed
            | Self::TooManyConnections => LogLevel::Warn,
            Self::Internal | Self::Unexpected | Self::InvalidConfig => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
