use thiserror::Error;

/// Ошибки инициализации подсистемы логирования.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Неизвестный уровень логирования
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),

    /// Неизвестный формат вывода
    #[error("invalid log format '{0}'")]
    InvalidFormat(String),

    /// Некорректная директива фильтра
    #[error("invalid filter directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },

    /// Не удалось создать каталог логов или файл
    #[error("log directory error: {0}")]
    Io(#[from] std::io::Error),

    /// Глобальный subscriber уже установлен
    #[error("tracing subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}
