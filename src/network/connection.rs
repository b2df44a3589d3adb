use std::{
    collections::HashMap,
    io::ErrorKind,
    net::{IpAddr, SocketAddr},
    str::FromStr,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    select,
    sync::{mpsc, Notify, OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
    time::{sleep_until, timeout, Instant},
};
use tracing::{debug, error, info, trace, warn};

use super::protocol::{decode_frame, encode_frame, ClientFrame, FrameReader, ServerFrame, MAX_FRAME_LEN};
use crate::{
    news::{
        service::single_field, FeedPayload, MutationField, NewsEvent, NewsService, QueryField,
        SubscriptionField,
    },
    pubsub::{CancelHandle, Subscription},
    ErrorExt, NetworkError, ProtocolError,
};

/// Конфигурация для обработки соединений
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Максимальное кол-во одновременных соединений
    pub max_connections: usize,
    /// Максимальное кол-во соединений с одного IP
    pub max_connections_per_ip: usize,
    /// Таймаут простоя соединения без активных подписок
    pub idle_timeout: Duration,
    /// Таймаут записи кадра
    pub write_timeout: Duration,
    /// Ёмкость исходящей очереди кадров соединения
    pub outbound_buffer: usize,
    /// Максимальная длина входящего кадра
    pub max_frame_len: usize,
    /// Сколько ждать закрытия соединений при остановке сервера
    pub shutdown_timeout: Duration,
}

/// Менеджер соединений с защитой от DoS и graceful shutdown
#[derive(Debug)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    /// Семафор для общего лимита соединений
    connection_semaphore: Arc<Semaphore>,
    /// Счётчик соединений по IP адресам
    ip_connections: Mutex<HashMap<IpAddr, usize>>,
    /// Общий счётчик активных соединений
    active_connections: AtomicUsize,
    /// Сигнал для graceful shutdown
    shutdown_signal: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
    /// Счётчик для генерации ID соединений
    connection_counter: AtomicU64,
}

/// Подписка, которую обслуживает соединение.
struct ActiveSubscription {
    cancel: CancelHandle<FeedPayload>,
    pump: JoinHandle<()>,
}

/// Что делать после обработки кадра.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Обработчик отдельного соединения
pub struct ConnectionHandler {
    connection_id: u64,
    reader: FrameReader<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    addr: SocketAddr,
    service: NewsService,
    config: ConnectionConfig,
    shutdown_signal: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
    subscriptions: HashMap<String, ActiveSubscription>,
    outbound_tx: mpsc::Sender<ServerFrame>,
    outbound_rx: mpsc::Receiver<ServerFrame>,
    last_activity: Instant,
}

/// Снимает счётчики соединения при выходе из `handle_connection`.
struct ConnectionSlot<'a> {
    manager: &'a ConnectionManager,
    ip: IpAddr,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            connection_semaphore: Arc::new(Semaphore::new(config.max_connections)),
            config,
            ip_connections: Mutex::new(HashMap::new()),
            active_connections: AtomicUsize::new(0),
            shutdown_signal: Arc::new(Notify::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
            connection_counter: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Получение текущее кол-во активных соединений
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Инициализация graceful shutdown
    pub fn shutdown(&self) {
        info!(
            active_connections = self.active_connections(),
            "Initiating graceful shutdown for connection manager"
        );
        self.shutting_down.store(true, Ordering::Release);
        self.shutdown_signal.notify_waiters();
    }

    /// Ждать завершения всех активных соединений
    pub async fn wait_for_shutdown(
        &self,
        timeout_duration: Duration,
    ) -> Result<()> {
        let start = Instant::now();

        while self.active_connections() > 0 {
            if start.elapsed() > timeout_duration {
                warn!(
                    active_connections = self.active_connections(),
                    "Shutdown timeout reached"
                );
                return Err(anyhow!("Shutdown timeout exceeded"));
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        info!("All connections closed gracefully");
        Ok(())
    }

    /// Обрабатывает новое соединение
    pub async fn handle_connection(
        &self,
        mut socket: TcpStream,
        addr: SocketAddr,
        service: NewsService,
    ) -> Result<()> {
        let slot = match self.acquire_slot(addr) {
            Ok(slot) => slot,
            Err(e) => {
                warn!(peer = %addr, error = %e, "Connection rejected");
                if let Ok(line) = encode_frame(&ServerFrame::error(None, &e)) {
                    let _ = timeout(self.config.write_timeout, socket.write_all(line.as_bytes())).await;
                }
                let _ = socket.shutdown().await;
                return Err(e.into());
            }
        };

        let connection_count = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        let connection_id = self.connection_counter.fetch_add(1, Ordering::Relaxed) + 1;

        info!(
            connection_id,
            peer = %addr,
            active = connection_count,
            "Connection established"
        );

        let handler = ConnectionHandler::new(
            connection_id,
            socket,
            addr,
            service,
            self.config.clone(),
            self.shutdown_signal.clone(),
            self.shutting_down.clone(),
        );

        let result = handler.run().await;

        drop(slot);
        let remaining = self.active_connections.fetch_sub(1, Ordering::Relaxed) - 1;

        match &result {
            Ok(_) => debug!(connection_id, peer = %addr, remaining, "Connection closed"),
            Err(e) => error!(
                connection_id,
                peer = %addr,
                remaining,
                error = %e,
                "Connection closed with error"
            ),
        }

        result
    }

    /// Занимает место под соединение с данного IP или объясняет, почему
    /// нельзя.
    fn acquire_slot(
        &self,
        addr: SocketAddr,
    ) -> Result<ConnectionSlot<'_>, NetworkError> {
        let permit = self
            .connection_semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| NetworkError::TooManyConnections {
                current: self.active_connections(),
                max: self.config.max_connections,
            })?;

        let ip = addr.ip();
        let mut ip_connections = self.ip_connections.lock();
        let count = ip_connections.entry(ip).or_insert(0);
        if *count >= self.config.max_connections_per_ip {
            return Err(NetworkError::TooManyConnectionsFromIp {
                ip: ip.to_string(),
                max: self.config.max_connections_per_ip,
            });
        }
        *count += 1;

        Ok(ConnectionSlot {
            manager: self,
            ip,
            _permit: permit,
        })
    }

    /// Уменьшить счётчик соединений для IP
    fn release_ip(
        &self,
        ip: IpAddr,
    ) {
        let mut ip_connections = self.ip_connections.lock();
        if let Some(count) = ip_connections.get_mut(&ip) {
            *count = count.saturating_sub(1);
            // удаляем запись если соединений больше нет
            if *count == 0 {
                ip_connections.remove(&ip);
            }
        }
    }

    #[cfg(test)]
    fn connections_from(
        &self,
        ip: IpAddr,
    ) -> usize {
        self.ip_connections.lock().get(&ip).copied().unwrap_or(0)
    }
}

impl Drop for ConnectionSlot<'_> {
    fn drop(&mut self) {
        self.manager.release_ip(self.ip);
    }
}

impl ConnectionHandler {
    fn new(
        connection_id: u64,
        socket: TcpStream,
        addr: SocketAddr,
        service: NewsService,
        config: ConnectionConfig,
        shutdown_signal: Arc<Notify>,
        shutting_down: Arc<AtomicBool>,
    ) -> Self {
        // Разделяем socket на части для чтения и записи
        let (read_half, write_half) = socket.into_split();
        let reader = FrameReader::with_max_len(BufReader::new(read_half), config.max_frame_len);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer.max(1));

        Self {
            connection_id,
            reader,
            writer: write_half,
            addr,
            service,
            config,
            shutdown_signal,
            shutting_down,
            subscriptions: HashMap::new(),
            outbound_tx,
            outbound_rx,
            last_activity: Instant::now(),
        }
    }

    /// Основной цикл обработки соединения.
    async fn run(mut self) -> Result<()> {
        let shutdown_signal = self.shutdown_signal.clone();
        let shutdown = shutdown_signal.notified();
        tokio::pin!(shutdown);

        let result = if self.shutting_down.load(Ordering::Acquire) {
            self.send_frame(&ServerFrame::bye("server shutting down"))
                .await
        } else {
            self.serve(shutdown).await
        };

        self.cancel_all();
        // Graceful close
        Self::graceful_close_writer(self.connection_id, self.writer).await;
        result
    }

    async fn serve(
        &mut self,
        mut shutdown: std::pin::Pin<&mut tokio::sync::futures::Notified<'_>>,
    ) -> Result<()> {
        let (id, addr) = (self.connection_id, self.addr);

        loop {
            let idle_deadline = self.last_activity + self.config.idle_timeout;

            select! {
                // Проверяем сигнал shutdown
                _ = &mut shutdown => {
                    info!(connection_id = id, peer = %addr, "Received shutdown signal");
                    self.send_frame(&ServerFrame::bye("server shutting down")).await?;
                    break;
                }

                // Проверяем таймаут простоя (только без активных подписок)
                _ = sleep_until(idle_deadline), if self.subscriptions.is_empty() => {
                    warn!(connection_id = id, peer = %addr, "Idle timeout");
                    self.send_frame(&ServerFrame::bye("idle timeout")).await?;
                    break;
                }

                // Кадры подписок
                Some(frame) = self.outbound_rx.recv() => {
                    if let Err(e) = self.forward(frame).await {
                        error!(connection_id = id, peer = %addr, error = %e, "Failed to forward subscription frame");
                        break;
                    }
                }

                // Кадры клиента
                read = self.reader.next_frame() => {
                    match read {
                        Ok(Some(line)) => {
                            self.last_activity = Instant::now();
                            if self.handle_line(line).await? == Flow::Close {
                                info!(connection_id = id, peer = %addr, "Client sent quit, closing");
                                break;
                            }
                        }
                        Ok(None) => {
                            // Клиент закрыл соединение
                            debug!(connection_id = id, peer = %addr, "Client closed connection");
                            break;
                        }
                        Err(e) => {
                            if Self::is_recoverable_error(&e) {
                                debug!(connection_id = id, peer = %addr, error = %e, "Recoverable read error");
                                break;
                            }
                            error!(connection_id = id, peer = %addr, error = %e, "Fatal read error");
                            return Err(NetworkError::from(e).into());
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Разбирает строку и выполняет кадр. Ошибки протокола уходят клиенту
    /// кадром `error`, соединение продолжает работать.
    async fn handle_line(
        &mut self,
        line: Result<String, ProtocolError>,
    ) -> Result<Flow> {
        trace!(connection_id = self.connection_id, frame = ?line, "Received frame");

        let frame = match line.and_then(|l| decode_frame::<ClientFrame>(&l)) {
            Ok(frame) => frame,
            Err(e) => {
                self.report(None, &e).await?;
                return Ok(Flow::Continue);
            }
        };

        let reply = match frame {
            ClientFrame::Ping => Ok(ServerFrame::Pong),
            ClientFrame::Quit => {
                self.send_frame(&ServerFrame::bye("bye")).await?;
                return Ok(Flow::Close);
            }
            ClientFrame::Query { id, field } => {
                self.query(&field).map(|payload| ServerFrame::Data { id: id.clone(), payload }).map_err(|e| (id, e))
            }
            ClientFrame::Mutation { id, field, args } => self
                .mutation(&field, args)
                .map(|payload| ServerFrame::Data {
                    id: id.clone(),
                    payload,
                })
                .map_err(|e| (id, e)),
            ClientFrame::Subscribe { id, fields } => match self.subscribe(&id, &fields).await? {
                Ok(()) => Ok(ServerFrame::Ack { id }),
                Err(e) => Err((id, e)),
            },
            ClientFrame::Complete { id } => {
                if self.subscriptions.contains_key(&id) {
                    debug!(
                        connection_id = self.connection_id,
                        subscription_id = %id,
                        "Subscription completed by client"
                    );
                    self.finish_subscription(&id).await?;
                    return Ok(Flow::Continue);
                }
                Err((id.clone(), ProtocolError::UnknownSubscription { id }))
            }
        };

        match reply {
            Ok(frame) => self.send_frame(&frame).await?,
            Err((id, e)) => self.report(Some(id), &e).await?,
        }
        Ok(Flow::Continue)
    }

    fn query(
        &self,
        field: &str,
    ) -> Result<serde_json::Value, ProtocolError> {
        let field = QueryField::from_str(field).map_err(|_| ProtocolError::UnknownField {
            kind: "query",
            field: field.to_string(),
        })?;
        self.service
            .query(field)
            .map_err(|e| ProtocolError::EncodeFailed {
                reason: e.to_string(),
            })
    }

    fn mutation(
        &self,
        field: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ProtocolError> {
        let field = MutationField::from_str(field).map_err(|_| ProtocolError::UnknownField {
            kind: "mutation",
            field: field.to_string(),
        })?;

        match field {
            MutationField::CreateNewsEvent => {
                let input: NewsEvent = if args.is_null() {
                    NewsEvent::default()
                } else {
                    serde_json::from_value(args).map_err(|e| ProtocolError::MalformedFrame {
                        reason: format!("invalid createNewsEvent args: {e}"),
                    })?
                };
                let event = self
                    .service
                    .create_news_event(input.title, input.description);
                let value = serde_json::to_value(event).map_err(|e| ProtocolError::EncodeFailed {
                    reason: e.to_string(),
                })?;
                Ok(single_field(field.as_ref(), value))
            }
        }
    }

    /// Создаёт подписку. Внешний `Result` несёт ошибки записи в сокет,
    /// внутренний уходит клиенту кадром `error`.
    async fn subscribe(
        &mut self,
        id: &str,
        fields: &[String],
    ) -> Result<Result<(), ProtocolError>> {
        if fields.is_empty() {
            return Ok(Err(ProtocolError::EmptySubscription { id: id.to_string() }));
        }
        let fields = match fields
            .iter()
            .map(|f| {
                SubscriptionField::from_str(f).map_err(|_| ProtocolError::UnknownField {
                    kind: "subscription",
                    field: f.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(fields) => fields,
            Err(e) => return Ok(Err(e)),
        };

        let previous = self
            .subscriptions
            .get(id)
            .map(|existing| existing.cancel.is_cancelled());
        match previous {
            Some(false) => {
                return Ok(Err(ProtocolError::DuplicateSubscription { id: id.to_string() }));
            }
            // Подписка с этим id уже отменена, но её `complete` ещё в очереди:
            // клиент должен увидеть его раньше нового `ack`
            Some(true) => self.finish_subscription(id).await?,
            None => {}
        }

        let subscription = self.service.subscribe(&fields);
        let cancel = subscription.cancel_handle();
        let pump = tokio::spawn(Self::pump(
            id.to_string(),
            subscription,
            self.outbound_tx.clone(),
        ));

        debug!(
            connection_id = self.connection_id,
            subscription_id = id,
            channel_id = cancel.id(),
            ?fields,
            "Subscription started"
        );

        self.subscriptions
            .insert(id.to_string(), ActiveSubscription { cancel, pump });
        Ok(Ok(()))
    }

    /// Завершает подписку и отправляет её `complete` ровно один раз.
    ///
    /// Задача подписки останавливается до отмены, поэтому сама `complete` уже
    /// не пошлёт. Кадры, которые она успела поставить в очередь, уходят
    /// клиенту раньше `complete`.
    async fn finish_subscription(
        &mut self,
        id: &str,
    ) -> Result<()> {
        let Some(active) = self.subscriptions.remove(id) else {
            return Ok(());
        };
        active.pump.abort();
        let _ = active.pump.await;
        active.cancel.cancel();

        let mut completed = false;
        while let Ok(frame) = self.outbound_rx.try_recv() {
            if matches!(&frame, ServerFrame::Complete { id: done } if done == id) {
                completed = true;
            }
            self.forward(frame).await?;
        }
        if !completed {
            self.send_frame(&ServerFrame::Complete { id: id.to_string() })
                .await?;
        }
        Ok(())
    }

    /// Пересылает кадр подписки клиенту. После `complete` подписка больше не
    /// считается активной.
    async fn forward(
        &mut self,
        frame: ServerFrame,
    ) -> Result<()> {
        if let ServerFrame::Complete { id } = &frame {
            self.subscriptions.remove(id);
        }
        self.send_frame(&frame).await
    }

    /// Переносит сообщения подписки в исходящую очередь соединения.
    ///
    /// Когда подписка отменена политикой переполнения, отправляет `complete`.
    async fn pump(
        id: String,
        mut subscription: Subscription<FeedPayload>,
        outbound: mpsc::Sender<ServerFrame>,
    ) {
        while let Some(message) = subscription.recv().await {
            let frame = ServerFrame::Next {
                id: id.clone(),
                payload: message.into_payload(),
            };
            if outbound.send(frame).await.is_err() {
                // Соединение закрыто
                return;
            }
        }
        let _ = outbound.send(ServerFrame::Complete { id }).await;
    }

    /// Отменяет все подписки соединения.
    fn cancel_all(&mut self) {
        let count = self.subscriptions.len();
        for (_, active) in self.subscriptions.drain() {
            active.cancel.cancel();
            active.pump.abort();
        }
        if count > 0 {
            debug!(
                connection_id = self.connection_id,
                subscriptions = count,
                "Cancelled connection subscriptions"
            );
        }
    }

    async fn report(
        &mut self,
        id: Option<String>,
        err: &ProtocolError,
    ) -> Result<()> {
        debug!(
            connection_id = self.connection_id,
            peer = %self.addr,
            code = err.status_code().code(),
            error = %err,
            "Protocol error"
        );
        self.send_frame(&ServerFrame::error(id, err)).await
    }

    /// Отправляет кадр с таймаутом
    async fn send_frame(
        &mut self,
        frame: &ServerFrame,
    ) -> Result<()> {
        let line = match encode_frame(frame) {
            Ok(line) => line,
            Err(e) => {
                error!(connection_id = self.connection_id, error = %e, frame = frame.kind(), "Failed to encode frame");
                return Ok(());
            }
        };

        timeout(self.config.write_timeout, self.writer.write_all(line.as_bytes()))
            .await
            .map_err(|_| NetworkError::WriteTimeout)
            .context("Write timeout")?
            .context("Failed to write frame")?;

        Ok(())
    }

    /// Проверяет, является ли ошибка восстанавливаемой
    fn is_recoverable_error(error: &std::io::Error) -> bool {
        matches!(
            error.kind(),
            ErrorKind::UnexpectedEof
                | ErrorKind::BrokenPipe
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::TimedOut
        )
    }

    /// Graceful закрытие соединения
    async fn graceful_close_writer(
        connection_id: u64,
        mut writer: OwnedWriteHalf,
    ) {
        if let Err(e) = writer.shutdown().await {
            // Игнорируем ошибки при закрытии уже закрытого соединения
            if e.kind() != ErrorKind::NotConnected {
                debug!(connection_id, error = %e, "Error during shutdown");
            }
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connections: 10000,
            max_connections_per_ip: 100,
            idle_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(10),
            outbound_buffer: 1024,
            max_frame_len: MAX_FRAME_LEN,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::{TcpListener, TcpStream},
        time::Duration,
    };

    use super::*;
    use crate::{pubsub::ChannelConfig, StatusCode};

    fn service() -> NewsService {
        NewsService::seeded(ChannelConfig::unbounded())
    }

    async fn read_json(lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>) -> serde_json::Value {
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .expect("read timed out")
            .unwrap()
            .expect("connection closed");
        serde_json::from_str(&line).unwrap()
    }

    /// Поднимает один обработчик и возвращает клиентский сокет.
    async fn spawn_handler(
        config: ConnectionConfig,
        service: NewsService,
    ) -> anyhow::Result<(TcpStream, JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let local_addr = listener.local_addr()?;

        let server = tokio::spawn(async move {
            let (socket, addr) = listener.accept().await?;
            let handler = ConnectionHandler::new(
                1,
                socket,
                addr,
                service,
                config,
                Arc::new(Notify::new()),
                Arc::new(AtomicBool::new(false)),
            );
            handler.run().await
        });

        let client = TcpStream::connect(local_addr).await?;
        Ok((client, server))
    }

    #[tokio::test]
    async fn handler_ping_query_and_quit() -> anyhow::Result<()> {
        let (client, server) = spawn_handler(ConnectionConfig::default(), service()).await?;
        let (read_half, mut write_half) = client.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"{\"type\":\"ping\"}\n").await?;
        assert_eq!(read_json(&mut lines).await, json!({"type": "pong"}));

        write_half
            .write_all(b"{\"type\":\"query\",\"id\":\"q1\",\"field\":\"placeholder\"}\n")
            .await?;
        assert_eq!(
            read_json(&mut lines).await,
            json!({"type": "data", "id": "q1", "payload": {"placeholder": true}})
        );

        write_half.write_all(b"{\"type\":\"quit\"}\n").await?;
        assert_eq!(read_json(&mut lines).await["type"], "bye");

        server.await??;
        Ok(())
    }

    /// Тест проверяет, что ошибки протокола не закрывают соединение.
    #[tokio::test]
    async fn handler_reports_errors_and_keeps_going() -> anyhow::Result<()> {
        let (client, server) = spawn_handler(ConnectionConfig::default(), service()).await?;
        let (read_half, mut write_half) = client.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"garbage\n").await?;
        let v = read_json(&mut lines).await;
        assert_eq!(v["type"], "error");
        assert_eq!(v["code"], StatusCode::InvalidFrame.code());
        assert!(v.get("id").is_none());

        write_half
            .write_all(b"{\"type\":\"query\",\"id\":\"q\",\"field\":\"nope\"}\n")
            .await?;
        let v = read_json(&mut lines).await;
        assert_eq!(v["id"], "q");
        assert_eq!(v["code"], StatusCode::InvalidCommand.code());

        write_half
            .write_all(b"{\"type\":\"subscribe\",\"id\":\"s\",\"fields\":[]}\n")
            .await?;
        assert_eq!(read_json(&mut lines).await["code"], StatusCode::InvalidArgs.code());

        write_half
            .write_all(b"{\"type\":\"complete\",\"id\":\"missing\"}\n")
            .await?;
        assert_eq!(read_json(&mut lines).await["code"], StatusCode::NotFound.code());

        write_half.write_all(b"{\"type\":\"ping\"}\n").await?;
        assert_eq!(read_json(&mut lines).await["type"], "pong");

        drop(write_half);
        server.await??;
        Ok(())
    }

    #[tokio::test]
    async fn handler_subscription_lifecycle() -> anyhow::Result<()> {
        let svc = service();
        let (client, server) = spawn_handler(ConnectionConfig::default(), svc.clone()).await?;
        let (read_half, mut write_half) = client.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(b"{\"type\":\"subscribe\",\"id\":\"s1\",\"fields\":[\"newsFeed\"]}\n")
            .await?;
        assert_eq!(read_json(&mut lines).await, json!({"type": "ack", "id": "s1"}));
        assert_eq!(svc.broker().subscriber_count(crate::news::EVENT_CREATED), 1);

        write_half
            .write_all(b"{\"type\":\"subscribe\",\"id\":\"s1\",\"fields\":[\"allEvents\"]}\n")
            .await?;
        assert_eq!(
            read_json(&mut lines).await["code"],
            StatusCode::AlreadyExists.code()
        );

        svc.create_news_event("A", "B");
        assert_eq!(
            read_json(&mut lines).await,
            json!({"type": "next", "id": "s1", "payload": {"newsFeed": {"title": "A", "description": "B"}}})
        );

        write_half
            .write_all(b"{\"type\":\"complete\",\"id\":\"s1\"}\n")
            .await?;
        assert_eq!(read_json(&mut lines).await, json!({"type": "complete", "id": "s1"}));
        assert_eq!(svc.broker().subscriber_count(crate::news::EVENT_CREATED), 0);

        drop(write_half);
        server.await??;
        Ok(())
    }

    /// Тест проверяет, что при обрыве соединения подписки отменяются.
    #[tokio::test]
    async fn handler_disconnect_cancels_subscriptions() -> anyhow::Result<()> {
        let svc = service();
        let (client, server) = spawn_handler(ConnectionConfig::default(), svc.clone()).await?;
        let (read_half, mut write_half) = client.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(
                b"{\"type\":\"subscribe\",\"id\":\"s\",\"fields\":[\"newsFeed\",\"allEvents\"]}\n",
            )
            .await?;
        assert_eq!(read_json(&mut lines).await["type"], "ack");
        assert_eq!(svc.broker().active_topics().len(), 2);

        drop(write_half);
        drop(lines);
        server.await??;

        assert!(svc.broker().active_topics().is_empty());
        assert_eq!(svc.broker().metrics().active_subscriptions(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn handler_idle_timeout_sends_bye() -> anyhow::Result<()> {
        let cfg = ConnectionConfig {
            idle_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let (client, server) = spawn_handler(cfg, service()).await?;
        let (read_half, _write_half) = client.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let v = read_json(&mut lines).await;
        assert_eq!(v, json!({"type": "bye", "reason": "idle timeout"}));

        server.await??;
        Ok(())
    }

    /// Тест проверяет, что после завершения последней подписки таймаут
    /// простоя снова работает.
    #[tokio::test]
    async fn handler_idle_timeout_after_complete() -> anyhow::Result<()> {
        let cfg = ConnectionConfig {
            idle_timeout: Duration::from_millis(150),
            ..Default::default()
        };
        let (client, server) = spawn_handler(cfg, service()).await?;
        let (read_half, mut write_half) = client.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(b"{\"type\":\"subscribe\",\"id\":\"s1\",\"fields\":[\"newsFeed\"]}\n")
            .await?;
        assert_eq!(read_json(&mut lines).await, json!({"type": "ack", "id": "s1"}));

        write_half
            .write_all(b"{\"type\":\"complete\",\"id\":\"s1\"}\n")
            .await?;
        assert_eq!(read_json(&mut lines).await, json!({"type": "complete", "id": "s1"}));

        assert_eq!(
            read_json(&mut lines).await,
            json!({"type": "bye", "reason": "idle timeout"})
        );

        server.await??;
        Ok(())
    }

    /// Тест проверяет, что `complete` старой подписки приходит раньше `ack`
    /// новой подписки с тем же id.
    #[tokio::test]
    async fn handler_reused_id_completes_before_ack() -> anyhow::Result<()> {
        let svc = service();
        let (client, server) = spawn_handler(ConnectionConfig::default(), svc.clone()).await?;
        let (read_half, mut write_half) = client.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(b"{\"type\":\"subscribe\",\"id\":\"s1\",\"fields\":[\"newsFeed\"]}\n")
            .await?;
        assert_eq!(read_json(&mut lines).await, json!({"type": "ack", "id": "s1"}));

        write_half
            .write_all(
                b"{\"type\":\"complete\",\"id\":\"s1\"}\n\
                  {\"type\":\"subscribe\",\"id\":\"s1\",\"fields\":[\"allEvents\"]}\n",
            )
            .await?;
        assert_eq!(read_json(&mut lines).await, json!({"type": "complete", "id": "s1"}));
        assert_eq!(read_json(&mut lines).await, json!({"type": "ack", "id": "s1"}));

        assert_eq!(svc.broker().subscriber_count(crate::news::EVENT_CREATED), 0);
        assert_eq!(svc.broker().subscriber_count(crate::news::FETCH_EVENTS), 1);

        svc.create_news_event("A", "B");
        let v = read_json(&mut lines).await;
        assert_eq!(v["type"], "next");
        assert_eq!(v["id"], "s1");
        assert_eq!(v["payload"]["allEvents"].as_array().map(Vec::len), Some(2));

        // Повторный `complete` уже завершённой подписки: ошибка
        write_half
            .write_all(b"{\"type\":\"complete\",\"id\":\"s1\"}\n{\"type\":\"complete\",\"id\":\"s1\"}\n")
            .await?;
        assert_eq!(read_json(&mut lines).await, json!({"type": "complete", "id": "s1"}));
        assert_eq!(read_json(&mut lines).await["code"], StatusCode::NotFound.code());

        drop(write_half);
        server.await??;
        Ok(())
    }

    #[test]
    fn test_per_ip_limit() {
        let manager = ConnectionManager::new(ConnectionConfig {
            max_connections_per_ip: 1,
            ..Default::default()
        });
        let addr: SocketAddr = "10.0.0.1:5000".parse().unwrap();

        let slot = manager.acquire_slot(addr).unwrap();
        assert_eq!(manager.connections_from(addr.ip()), 1);
        assert!(matches!(
            manager.acquire_slot(addr),
            Err(NetworkError::TooManyConnectionsFromIp { .. })
        ));

        drop(slot);
        assert_eq!(manager.connections_from(addr.ip()), 0);
        assert!(manager.acquire_slot(addr).is_ok());
    }

    #[test]
    fn test_global_limit() {
        let manager = ConnectionManager::new(ConnectionConfig {
            max_connections: 1,
            ..Default::default()
        });
        let a: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let b: SocketAddr = "10.0.0.2:5000".parse().unwrap();

        let _slot = manager.acquire_slot(a).unwrap();
        assert!(matches!(
            manager.acquire_slot(b),
            Err(NetworkError::TooManyConnections { max: 1, .. })
        ));
    }
}
