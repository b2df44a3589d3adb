use std::{net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncWriteExt, BufReader, BufWriter},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::timeout,
};
use tracing::{debug, trace};

use super::ClientResult;
use crate::{
    network::protocol::{decode_frame, encode_frame, ClientFrame, FrameReader, ServerFrame},
    ClientError,
};

/// Клиентское соединение с сервером newsbus
///
/// Управляет TCP соединением и обменом JSON-кадрами.
pub struct ClientConnection {
    /// Адрес сервера
    addr: SocketAddr,
    /// Читающая часть соединения
    reader: FrameReader<BufReader<OwnedReadHalf>>,
    /// Пишущая часть соединения с буферизацией
    writer: BufWriter<OwnedWriteHalf>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl ClientConnection {
    /// Создаёт новое соединение с сервером.
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> ClientResult<Self> {
        debug!("Connecting to {addr}");

        // Подключаемся с таймаутом
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::ConnectionTimeout)?
            .map_err(|e| ClientError::ConnectionFailed {
                address: addr.to_string(),
                reason: e.to_string(),
            })?;
        debug!("Connection established with {addr}");

        // Разделяем stream на read/write половины
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            addr,
            reader: FrameReader::new(BufReader::new(read_half)),
            writer: BufWriter::new(write_half),
            read_timeout,
            write_timeout,
        })
    }

    /// Отправляет кадр серверу.
    pub async fn send_frame(
        &mut self,
        frame: &ClientFrame,
    ) -> ClientResult<()> {
        trace!("Sending frame: {frame:?}");
        let line = encode_frame(frame).map_err(|e| ClientError::EncodingError {
            reason: e.to_string(),
        })?;
        self.write_line(&line).await
    }

    /// Отправляет строку как есть; перевод строки добавляется при
    /// необходимости.
    pub async fn send_raw(
        &mut self,
        line: &str,
    ) -> ClientResult<()> {
        let mut line = line.trim_end().to_string();
        line.push('\n');
        self.write_line(&line).await
    }

    /// Получает кадр, ожидая не дольше таймаута чтения.
    pub async fn receive_frame(&mut self) -> ClientResult<ServerFrame> {
        let read_timeout = self.read_timeout;
        self.receive_frame_within(read_timeout)
            .await?
            .ok_or(ClientError::ReadTimeout)
    }

    /// Получает кадр, если он придёт за `wait`.
    pub async fn receive_frame_within(
        &mut self,
        wait: Duration,
    ) -> ClientResult<Option<ServerFrame>> {
        match timeout(wait, self.receive_frame_untimed()).await {
            Ok(frame) => frame.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Получает кадр без таймаута. Используется для ожидания событий
    /// подписки.
    pub async fn receive_frame_untimed(&mut self) -> ClientResult<ServerFrame> {
        let line = self
            .reader
            .next_frame()
            .await?
            .ok_or(ClientError::ConnectionClosed)?
            .map_err(|e| ClientError::DecodingError {
                reason: e.to_string(),
            })?;

        let frame = decode_frame(&line).map_err(|e| ClientError::DecodingError {
            reason: e.to_string(),
        })?;
        trace!("Frame received: {frame:?}");
        Ok(frame)
    }

    /// Возвращает адрес сервера
    pub fn server_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Закрывает соединение
    pub async fn close(mut self) -> ClientResult<()> {
        debug!("Closing connection to {}", self.addr);
        self.writer.shutdown().await?;
        Ok(())
    }

    async fn write_line(
        &mut self,
        line: &str,
    ) -> ClientResult<()> {
        timeout(self.write_timeout, self.writer.write_all(line.as_bytes()))
            .await
            .map_err(|_| ClientError::WriteTimeout)??;

        // Сбрасываем буфер
        timeout(self.write_timeout, self.writer.flush())
            .await
            .map_err(|_| ClientError::WriteTimeout)??;
        Ok(())
    }
}
