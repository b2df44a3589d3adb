use std::{num::NonZeroUsize, path::Path, time::Duration};

use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    logging::LoggingConfig,
    network::{connection::ConnectionConfig, protocol::MAX_FRAME_LEN},
    pubsub::{ChannelConfig, OverflowPolicy},
    ConfigError,
};

/// Имя файла настроек, который ищется в текущем каталоге.
pub const DEFAULT_CONFIG_FILE: &str = "newsbus";

/// Префикс переменных окружения.
pub const ENV_PREFIX: &str = "NEWSBUS";

/// Настройки сервера.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Адрес прослушивания в виде `host:port`
    pub listen_address: String,
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
    /// Таймаут простоя соединения без подписок, секунды
    pub idle_timeout_secs: u64,
    pub write_timeout_secs: u64,
    /// Ёмкость исходящей очереди соединения, в кадрах
    pub outbound_buffer: usize,
    /// Ёмкость очереди подписчика; `None` — без ограничения
    pub channel_capacity: Option<usize>,
    pub overflow_policy: OverflowPolicy,
    /// Начинать с демонстрационного события
    pub seed_events: bool,
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:4000".to_string(),
            max_connections: 10000,
            max_connections_per_ip: 100,
            idle_timeout_secs: 300,
            write_timeout_secs: 10,
            outbound_buffer: 1024,
            channel_capacity: None,
            overflow_policy: OverflowPolicy::DropOldest,
            seed_events: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Загрузка настроек из `newsbus.toml` (если есть) и окружения.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None, None)
    }

    /// Загрузка настроек.
    ///
    /// Источники по возрастанию приоритета: значения по умолчанию, файл
    /// (`path` обязателен, `newsbus.*` в текущем каталоге нет), переменные
    /// `NEWSBUS_*` (вложенные ключи через `__`), `listen` из командной строки.
    pub fn load_from(
        path: Option<&Path>,
        listen: Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let cfg = Config::builder()
            // Добавляем значения по умолчанию
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            // Добавляем переменные окружения с префиксом NEWSBUS_
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("listen_address", listen)?
            .build()?;

        // Десериализуем конфигурацию в нашу структуру
        let settings: Settings = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Проверка значений после загрузки.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_listen_address(&self.listen_address)?;

        let limits = [
            ("max_connections", self.max_connections as u64),
            ("max_connections_per_ip", self.max_connections_per_ip as u64),
            ("idle_timeout_secs", self.idle_timeout_secs),
            ("write_timeout_secs", self.write_timeout_secs),
            ("outbound_buffer", self.outbound_buffer as u64),
        ];
        for (key, value) in limits {
            if value == 0 {
                return Err(ConfigError::invalid(key, "must be greater than zero"));
            }
        }

        if self.channel_capacity == Some(0) {
            return Err(ConfigError::invalid(
                "channel_capacity",
                "must be greater than zero (omit it for an unbounded queue)",
            ));
        }

        self.logging
            .validate()
            .map_err(|e| ConfigError::invalid("logging", e.to_string()))
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_connections: self.max_connections,
            max_connections_per_ip: self.max_connections_per_ip,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            outbound_buffer: self.outbound_buffer,
            max_frame_len: MAX_FRAME_LEN,
            ..ConnectionConfig::default()
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            capacity: self.channel_capacity.and_then(NonZeroUsize::new),
            overflow: self.overflow_policy,
        }
    }
}

fn validate_listen_address(addr: &str) -> Result<(), ConfigError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::invalid("listen_address", "expected <host>:<port>"))?;
    if host.is_empty() {
        return Err(ConfigError::invalid("listen_address", "host is empty"));
    }
    port.parse::<u16>()
        .map_err(|_| ConfigError::invalid("listen_address", format!("invalid port '{port}'")))?;
    Ok(())
}
