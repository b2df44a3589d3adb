use tracing::Subscriber;
use tracing_appender::{
    non_blocking,
    non_blocking::WorkerGuard,
    rolling::{self, RollingFileAppender},
};
use tracing_subscriber::{layer::Layer, registry::LookupSpan};

use crate::{
    logging::{
        config::{LoggingConfig, Rotation},
        formatter::{self, FormatOptions},
    },
    LoggingError,
};

/// Файловый слой по конфигурации.
///
/// Запись идёт через non-blocking writer; возвращённый `WorkerGuard` нужно
/// держать до завершения процесса, иначе хвост логов потеряется.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> Result<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard), LoggingError>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    config.ensure_log_dir()?;

    let file = &config.file;
    let appender: RollingFileAppender = match file.rotation {
        Rotation::Daily => rolling::daily(&file.directory, &file.prefix),
        Rotation::Hourly => rolling::hourly(&file.directory, &file.prefix),
        Rotation::Never => rolling::never(&file.directory, &file.prefix),
    };
    let (writer, guard) = non_blocking(appender);

    let options = FormatOptions {
        ansi: false,
        target: true,
        thread_ids: config.console.with_thread_ids,
        line_numbers: config.console.with_line_numbers,
    };
    Ok((formatter::build_layer(file.format, options, writer), guard))
}
