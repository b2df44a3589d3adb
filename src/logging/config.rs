use std::{collections::BTreeMap, env, fs, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};

use crate::LoggingError;

/// Уровни, которые принимает `level` и переопределения модулей.
const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Формат вывода событий.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Периодичность ротации файла логов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Настройки вывода в консоль.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Формат консоли; `None` — общий `format`
    pub format: Option<LogFormat>,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

/// Настройки вывода в файл.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    /// Префикс имени файла, к нему дописывается дата
    pub prefix: String,
    pub rotation: Rotation,
    pub format: LogFormat,
}

/// Конфигурация подсистемы логирования.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень (`trace`..`error`, `off`)
    pub level: String,
    pub format: LogFormat,
    pub console: ConsoleConfig,
    pub file: FileConfig,
    /// Уровни для отдельных модулей, например `newsbus::network = "debug"`
    pub modules: BTreeMap<String, String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: None,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("logs"),
            prefix: "newsbus.log".to_string(),
            rotation: Rotation::Daily,
            format: LogFormat::Json,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
            modules: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Применяет `NEWSBUS_LOG_LEVEL`, `NEWSBUS_LOG_FORMAT` и `NEWSBUS_LOG_DIR`.
    ///
    /// Заданный `NEWSBUS_LOG_DIR` заодно включает вывод в файл.
    pub fn apply_env_overrides(&mut self) -> Result<(), LoggingError> {
        if let Ok(level) = env::var("NEWSBUS_LOG_LEVEL") {
            self.level = level.trim().to_lowercase();
        }
        if let Ok(format) = env::var("NEWSBUS_LOG_FORMAT") {
            self.format = LogFormat::from_str(format.trim())
                .map_err(|_| LoggingError::InvalidFormat(format))?;
        }
        if let Ok(dir) = env::var("NEWSBUS_LOG_DIR") {
            self.file.directory = PathBuf::from(dir);
            self.file.enabled = true;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        if !is_level(&self.level) {
            return Err(LoggingError::InvalidLevel(self.level.clone()));
        }
        for (module, level) in &self.modules {
            if module.is_empty() || !is_level(level) {
                return Err(LoggingError::InvalidDirective {
                    directive: format!("{module}={level}"),
                    reason: "expected <module>=<level>".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Директива для `EnvFilter`, например `info,newsbus::network=debug`.
    pub fn build_filter_directive(&self) -> String {
        let mut directive = self.level.clone();
        for (module, level) in &self.modules {
            directive.push(',');
            directive.push_str(module);
            directive.push('=');
            directive.push_str(level);
        }
        directive
    }

    pub fn console_format(&self) -> LogFormat {
        self.console.format.unwrap_or(self.format)
    }

    /// Создаёт каталог логов, если вывод в файл включён.
    pub fn ensure_log_dir(&self) -> Result<(), LoggingError> {
        if self.file.enabled {
            fs::create_dir_all(&self.file.directory)?;
        }
        Ok(())
    }
}

fn is_level(level: &str) -> bool {
    LEVELS.contains(&level.to_ascii_lowercase().as_str())
}
