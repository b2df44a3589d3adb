use std::any::Any;

use newsbus_error::{ErrorExt, StatusCode};
use thiserror::Error;

/// Ошибки загрузки и проверки настроек сервера.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Ошибка источников конфигурации (файл, окружение)
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// Некорректное значение параметра
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(
        key: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key,
            reason: reason.into(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn status_code(&self) -> StatusCode {
        StatusCode::InvalidConfig
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::invalid("max_connections", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "invalid value for 'max_connections': must be greater than zero"
        );
        assert_eq!(err.status_code(), StatusCode::InvalidConfig);
    }
}
