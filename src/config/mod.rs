//! Настройки сервера: значения по умолчанию, файл `newsbus.toml`,
//! переменные окружения `NEWSBUS_*` и флаги командной строки.

pub mod settings;

pub use settings::*;
