//! Кадры протокола: одна JSON-строка на кадр, разделитель `\n`.

use std::{io, mem};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::{news::FeedPayload, ErrorExt, ProtocolError};

/// Максимальная длина кадра без перевода строки.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Кадры клиента.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
    Query {
        id: String,
        field: String,
    },
    Mutation {
        id: String,
        field: String,
        #[serde(default)]
        args: Value,
    },
    Subscribe {
        id: String,
        fields: Vec<String>,
    },
    Complete {
        id: String,
    },
    Quit,
}

/// Кадры сервера.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Pong,
    /// Ответ на `query` или `mutation`
    Data {
        id: String,
        payload: Value,
    },
    /// Подписка создана
    Ack {
        id: String,
    },
    /// Очередное событие подписки
    Next {
        id: String,
        payload: FeedPayload,
    },
    /// Подписка завершена
    Complete {
        id: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        code: u32,
        message: String,
    },
    /// Сервер закрывает соединение
    Bye {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ServerFrame {
    /// Кадр `error` с кодом и безопасным для клиента текстом.
    pub fn error(
        id: Option<String>,
        err: &impl ErrorExt,
    ) -> Self {
        Self::Error {
            id,
            code: err.status_code().code(),
            message: err.client_message(),
        }
    }

    pub fn bye(reason: impl Into<String>) -> Self {
        Self::Bye {
            reason: Some(reason.into()),
        }
    }

    /// Имя кадра, как в поле `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pong => "pong",
            Self::Data { .. } => "data",
            Self::Ack { .. } => "ack",
            Self::Next { .. } => "next",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Bye { .. } => "bye",
        }
    }

    /// Id запроса или подписки, к которому относится кадр.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Data { id, .. }
            | Self::Ack { id }
            | Self::Next { id, .. }
            | Self::Complete { id } => Some(id),
            Self::Error { id, .. } => id.as_deref(),
            Self::Pong | Self::Bye { .. } => None,
        }
    }
}

/// Разбирает строку кадра.
pub fn decode_frame<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    if line.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            size: line.len(),
            max: MAX_FRAME_LEN,
        });
    }
    serde_json::from_str(line).map_err(|e| ProtocolError::MalformedFrame {
        reason: e.to_string(),
    })
}

/// Кодирует кадр в строку с завершающим `\n`.
pub fn encode_frame<T: Serialize>(frame: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(frame).map_err(|e| ProtocolError::EncodeFailed {
        reason: e.to_string(),
    })?;
    line.push('\n');
    Ok(line)
}

/// Построчное чтение кадров с ограничением длины.
///
/// Состояние чтения хранится в самой структуре, поэтому `next_frame` можно
/// использовать в `select!`: недочитанная строка продолжится при следующем
/// вызове. Слишком длинная строка пропускается до конца и возвращается как
/// [`ProtocolError::FrameTooLarge`], соединение при этом остаётся рабочим.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    max_len: usize,
    /// Пропускаем хвост слишком длинной строки
    discarding: bool,
    discarded: usize,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_len(inner, MAX_FRAME_LEN)
    }

    pub fn with_max_len(
        inner: R,
        max_len: usize,
    ) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            max_len,
            discarding: false,
            discarded: 0,
        }
    }

    /// Следующая строка кадра.
    ///
    /// `Ok(None)` означает конец потока. Пустые строки пропускаются.
    pub async fn next_frame(&mut self) -> io::Result<Option<Result<String, ProtocolError>>> {
        loop {
            if self.discarding {
                self.discarded += self.buf.len();
                self.buf.clear();

                let n = (&mut self.inner)
                    .take(self.max_len as u64 + 1)
                    .read_until(b'\n', &mut self.buf)
                    .await?;
                if n == 0 {
                    return Ok(None);
                }
                if self.buf.last() == Some(&b'\n') {
                    let size = self.discarded + self.buf.len() - 1;
                    self.buf.clear();
                    self.discarded = 0;
                    self.discarding = false;
                    return Ok(Some(Err(ProtocolError::FrameTooLarge {
                        size,
                        max: self.max_len,
                    })));
                }
                continue;
            }

            let budget = (self.max_len + 1).saturating_sub(self.buf.len()) as u64;
            let n = (&mut self.inner)
                .take(budget)
                .read_until(b'\n', &mut self.buf)
                .await?;

            let complete = self.buf.last() == Some(&b'\n');
            if complete || (n == 0 && !self.buf.is_empty()) {
                let mut line = mem::take(&mut self.buf);
                if complete {
                    line.pop();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                }
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Ok(Some(String::from_utf8(line).map_err(|e| {
                    ProtocolError::InvalidUtf8 {
                        reason: e.utf8_error().to_string(),
                    }
                })));
            }
            if n == 0 {
                return Ok(None);
            }
            if self.buf.len() > self.max_len {
                self.discarding = true;
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
