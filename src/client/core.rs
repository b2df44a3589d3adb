use std::{collections::VecDeque, net::SocketAddr, time::Duration};

use serde_json::{json, Value};
use tracing::{debug, info};

use super::{ClientConnection, ClientResult};
use crate::{
    network::protocol::{ClientFrame, ServerFrame},
    news::{FeedPayload, MutationField, NewsEvent, QueryField, SubscriptionField},
    ClientError,
};

/// Конфигурация клиента.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Таймаут подключения
    pub connect_timeout: Duration,
    /// Таймаут ожидания ответа на запрос
    pub read_timeout: Duration,
    /// Таймаут записи
    pub write_timeout: Duration,
}

/// Событие подписки, полученное клиентом.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// Очередное значение подписки `id`
    Next { id: String, payload: FeedPayload },
    /// Сервер завершил подписку `id`
    Complete { id: String },
}

/// Клиент newsbus
///
/// Запросы выполняются по одному: клиент ждёт ответ с тем же `id`. Кадры
/// подписок, пришедшие в это время, откладываются и отдаются из
/// [`NewsClient::next_event`].
pub struct NewsClient {
    connection: ClientConnection,
    pending: VecDeque<SubscriptionEvent>,
    next_id: u64,
}

impl NewsClient {
    /// Подключается к серверу newsbus
    pub async fn connect(
        addr: SocketAddr,
        config: ClientConfig,
    ) -> ClientResult<Self> {
        info!("Connecting to newsbus server at {addr}");

        let connection = ClientConnection::connect(
            addr,
            config.connect_timeout,
            config.read_timeout,
            config.write_timeout,
        )
        .await?;

        Ok(Self {
            connection,
            pending: VecDeque::new(),
            next_id: 0,
        })
    }

    /// Проверка соединения.
    pub async fn ping(&mut self) -> ClientResult<()> {
        debug!("Sending ping");
        self.connection.send_frame(&ClientFrame::Ping).await?;
        self.wait_for("pong", None).await.map(|_| ())
    }

    /// Запрос поля и значение `payload[field]`.
    pub async fn query(
        &mut self,
        field: QueryField,
    ) -> ClientResult<Value> {
        let id = self.fresh_id("q");
        debug!(id, field = field.as_ref(), "Sending query");

        self.connection
            .send_frame(&ClientFrame::Query {
                id: id.clone(),
                field: field.as_ref().to_string(),
            })
            .await?;
        let frame = self.wait_for("data", Some(&id)).await?;
        take_field(frame, field.as_ref())
    }

    /// Все события ленты.
    pub async fn events(&mut self) -> ClientResult<Vec<NewsEvent>> {
        let value = self.query(QueryField::Events).await?;
        serde_json::from_value(value).map_err(|e| ClientError::DecodingError {
            reason: e.to_string(),
        })
    }

    /// Мутация `createNewsEvent`.
    pub async fn create_news_event(
        &mut self,
        title: &str,
        description: &str,
    ) -> ClientResult<NewsEvent> {
        let id = self.fresh_id("m");
        let field = MutationField::CreateNewsEvent.as_ref();
        debug!(id, title, "Sending createNewsEvent");

        self.connection
            .send_frame(&ClientFrame::Mutation {
                id: id.clone(),
                field: field.to_string(),
                args: json!({ "title": title, "description": description }),
            })
            .await?;
        let frame = self.wait_for("data", Some(&id)).await?;
        serde_json::from_value(take_field(frame, field)?).map_err(|e| {
            ClientError::DecodingError {
                reason: e.to_string(),
            }
        })
    }

    /// Подписывается на поля и возвращает id подписки после `ack`.
    pub async fn subscribe(
        &mut self,
        fields: &[SubscriptionField],
    ) -> ClientResult<String> {
        let id = self.fresh_id("s");
        debug!(id, ?fields, "Subscribing");

        self.connection
            .send_frame(&ClientFrame::Subscribe {
                id: id.clone(),
                fields: fields.iter().map(|f| f.as_ref().to_string()).collect(),
            })
            .await?;
        self.wait_for("ack", Some(&id)).await?;
        Ok(id)
    }

    /// Завершает подписку и ждёт подтверждения `complete`.
    pub async fn complete(
        &mut self,
        id: &str,
    ) -> ClientResult<()> {
        self.connection
            .send_frame(&ClientFrame::Complete { id: id.to_string() })
            .await?;
        self.wait_for("complete", Some(id)).await.map(|_| ())
    }

    /// Следующее событие любой подписки. Ждёт без таймаута.
    pub async fn next_event(&mut self) -> ClientResult<SubscriptionEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }

        match self.connection.receive_frame_untimed().await? {
            ServerFrame::Next { id, payload } => Ok(SubscriptionEvent::Next { id, payload }),
            ServerFrame::Complete { id } => Ok(SubscriptionEvent::Complete { id }),
            ServerFrame::Bye { .. } => Err(ClientError::ConnectionClosed),
            ServerFrame::Error { code, message, .. } => {
                Err(ClientError::ServerError { code, message })
            }
            other => Err(ClientError::UnexpectedResponse {
                expected: "next",
                got: other.kind().to_string(),
            }),
        }
    }

    /// Низкоуровневое соединение, например для отправки сырых кадров.
    pub fn connection(&mut self) -> &mut ClientConnection {
        &mut self.connection
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.connection.server_addr()
    }

    /// Отправляет `quit`, дожидается `bye` и закрывает соединение.
    pub async fn close(mut self) -> ClientResult<()> {
        info!("Closing connection to server");
        self.connection.send_frame(&ClientFrame::Quit).await?;
        loop {
            match self.connection.receive_frame().await {
                Ok(ServerFrame::Bye { .. }) | Err(ClientError::ConnectionClosed) => break,
                Ok(_) => continue,
                Err(e) => return Err(e),
            }
        }
        self.connection.close().await
    }

    fn fresh_id(
        &mut self,
        prefix: &str,
    ) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    /// Ждёт кадр вида `kind` с данным `id`, откладывая события подписок.
    async fn wait_for(
        &mut self,
        kind: &'static str,
        id: Option<&str>,
    ) -> ClientResult<ServerFrame> {
        loop {
            let frame = self.connection.receive_frame().await?;
            if frame.kind() == kind && frame.id() == id {
                return Ok(frame);
            }

            match frame {
                ServerFrame::Error { id: err_id, code, message }
                    if err_id.is_none() || err_id.as_deref() == id =>
                {
                    return Err(ClientError::ServerError { code, message });
                }
                ServerFrame::Bye { .. } => return Err(ClientError::ConnectionClosed),
                ServerFrame::Next { id, payload } => {
                    self.pending.push_back(SubscriptionEvent::Next { id, payload });
                }
                ServerFrame::Complete { id } => {
                    self.pending.push_back(SubscriptionEvent::Complete { id });
                }
                other => {
                    return Err(ClientError::UnexpectedResponse {
                        expected: kind,
                        got: other.kind().to_string(),
                    })
                }
            }
        }
    }
}

/// Достаёт `payload[field]` из кадра `data`.
fn take_field(
    frame: ServerFrame,
    field: &str,
) -> ClientResult<Value> {
    match frame {
        ServerFrame::Data {
            payload: Value::Object(mut map),
            ..
        } => map.remove(field).ok_or_else(|| ClientError::DecodingError {
            reason: format!("response has no '{field}' field"),
        }),
        other => Err(ClientError::UnexpectedResponse {
            expected: "data",
            got: other.kind().to_string(),
        }),
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
        }
    }
}
