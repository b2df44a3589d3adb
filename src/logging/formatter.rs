use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::Layer,
    registry::LookupSpan,
};

use crate::logging::config::LogFormat;

/// Параметры оформления строки лога.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FormatOptions {
    pub ansi: bool,
    pub target: bool,
    pub thread_ids: bool,
    pub line_numbers: bool,
}

/// Собирает fmt-слой нужного формата поверх `writer`.
///
/// Возвращает boxed trait-объект, чтобы стереть конкретный тип формата
/// (json/pretty/compact).
pub(crate) fn build_layer<S, W>(
    format: LogFormat,
    options: FormatOptions,
    writer: W,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_ansi(options.ansi)
        .with_target(options.target)
        .with_thread_ids(options.thread_ids)
        .with_thread_names(options.thread_ids)
        .with_line_number(options.line_numbers);

    match format {
        LogFormat::Json => Box::new(base.json().with_current_span(true)),
        LogFormat::Pretty => Box::new(base.pretty().with_span_events(FmtSpan::CLOSE)),
        LogFormat::Compact => Box::new(base.compact()),
    }
}
