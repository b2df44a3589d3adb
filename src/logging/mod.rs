//! Логирование на `tracing`: консоль, файл с ротацией, фильтры уровней.

pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

pub use self::config::{ConsoleConfig, FileConfig, LogFormat, LoggingConfig, Rotation};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::LoggingError;

/// Инициализация логирования с конфигурацией.
///
/// Устанавливает глобальный subscriber; повторный вызов вернёт
/// [`LoggingError::AlreadyInitialized`].
pub fn init_logging(mut config: LoggingConfig) -> Result<LoggingHandle, LoggingError> {
    config.apply_env_overrides()?;
    config.validate()?;

    let env_filter = filters::build_filter_from_config(&config)?;

    let console_layer = config
        .console
        .enabled
        .then(|| sinks::console::layer_with_config(&config));

    let (file_layer, file_guard) = if config.file.enabled {
        let (layer, guard) = sinks::file::layer_with_config(&config)?;
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        console_enabled = config.console.enabled,
        file_enabled = config.file.enabled,
        log_dir = %config.file.directory.display(),
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}
