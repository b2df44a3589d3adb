use tracing_subscriber::EnvFilter;

use crate::{logging::config::LoggingConfig, LoggingError};

/// Собирает фильтр уровней.
///
/// Если задан `RUST_LOG`, он важнее конфигурации.
pub fn build_filter_from_config(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = config.build_filter_directive();
    EnvFilter::try_new(&directive).map_err(|e| LoggingError::InvalidDirective {
        directive,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        sync::{Arc, Mutex},
    };

    use serial_test::serial;
    use tracing_subscriber::{fmt, prelude::*, registry::Registry};

    use super::*;

    // Мини-буферный writer для тестов
    #[derive(Clone)]
    struct VecMakeWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for VecMakeWriter {
        type Writer = VecWriterGuard;

        fn make_writer(&'a self) -> Self::Writer {
            VecWriterGuard(self.0.clone())
        }
    }

    struct VecWriterGuard(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriterGuard {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Тест проверяет, что `RUST_LOG` важнее конфигурации.
    #[test]
    #[serial]
    fn test_rust_log_wins() {
        env::set_var("RUST_LOG", "error");
        let cfg = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        let res = build_filter_from_config(&cfg);
        env::remove_var("RUST_LOG");

        assert!(res.is_ok());
    }

    #[test]
    #[serial]
    fn test_invalid_directive_is_error() {
        env::remove_var("RUST_LOG");
        let mut cfg = LoggingConfig::default();
        cfg.modules
            .insert("newsbus".to_string(), "this_is_invalid!!".to_string());

        assert!(matches!(
            build_filter_from_config(&cfg),
            Err(LoggingError::InvalidDirective { .. })
        ));
    }

    /// Тест проверяет поведение фильтра в runtime: при уровне `warn` события
    /// `info` не попадают в writer.
    #[test]
    #[serial]
    fn test_filter_drops_lower_levels() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            level: "warn".to_string(),
            ..Default::default()
        };
        let filter = build_filter_from_config(&cfg).unwrap();

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = fmt::layer()
            .with_writer(VecMakeWriter(buffer.clone()))
            .with_ansi(false)
            .with_filter(filter);
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("info message that should be filtered out");
            tracing::warn!("warn message that should pass");
        });

        let out = buffer.lock().unwrap();
        let s = String::from_utf8_lossy(&out);
        assert!(s.contains("warn message that should pass"));
        assert!(!s.contains("info message that should be filtered out"));
    }
}
