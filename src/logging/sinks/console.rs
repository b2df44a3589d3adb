use std::io;

use tracing::Subscriber;
use tracing_subscriber::{layer::Layer, registry::LookupSpan};

use crate::logging::{
    config::LoggingConfig,
    formatter::{self, FormatOptions},
};

/// Консольный слой по конфигурации. Пишет в stdout.
pub fn layer_with_config<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let options = FormatOptions {
        ansi: config.console.with_ansi,
        target: config.console.with_target,
        thread_ids: config.console.with_thread_ids,
        line_numbers: config.console.with_line_numbers,
    };
    formatter::build_layer(config.console_format(), options, io::stdout)
}
