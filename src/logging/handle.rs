use std::time::{Duration, Instant};

use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления lifecycle логирования.
///
/// Держит `WorkerGuard` файлового вывода: пока handle жив, фоновый поток
/// дописывает буфер в файл.
pub struct LoggingHandle {
    /// File guard (есть, если вывод в файл включён)
    file_guard: Option<WorkerGuard>,
    /// Timeout для flush при shutdown (по умолчанию 5 секунд)
    flush_timeout: Duration,
    shut_down: bool,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            flush_timeout: Duration::from_secs(5),
            shut_down: false,
        }
    }

    /// Устанавливает custom flush timeout.
    pub fn with_flush_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Graceful shutdown: сбрасывает буфер файлового вывода.
    pub fn shutdown(mut self) {
        self.shut_down = true;
        let Some(guard) = self.file_guard.take() else {
            return;
        };

        tracing::info!(
            timeout_ms = self.flush_timeout.as_millis() as u64,
            "Flushing file logs"
        );

        let start = Instant::now();
        drop(guard);
        let elapsed = start.elapsed();

        // Subscriber ещё жив, но файловый writer уже закрыт: пишем в stderr.
        if elapsed > self.flush_timeout {
            eprintln!(
                "WARNING: Logging shutdown took {}ms (timeout: {}ms)",
                elapsed.as_millis(),
                self.flush_timeout.as_millis()
            );
        }
    }

    /// Shutdown с явным таймаутом (для async контекстов).
    pub async fn shutdown_async(
        mut self,
        timeout: Duration,
    ) {
        self.shut_down = true;
        let Some(guard) = self.file_guard.take() else {
            return;
        };

        match tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || drop(guard)))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("Logging shutdown task panicked: {e}"),
            Err(_) => eprintln!(
                "WARNING: Logging shutdown exceeded timeout of {}ms",
                timeout.as_millis()
            ),
        }
    }
}

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        if !self.shut_down && self.file_guard.is_some() {
            eprintln!(
                "WARNING: LoggingHandle dropped without explicit shutdown(). \
                 Some logs may be lost."
            );
        }
    }
}
