use thiserror::Error;

/// Ошибка при неблокирующем получении сообщений.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryRecvError {
    /// Очередь пуста, но подписка активна
    #[error("no messages available")]
    Empty,

    /// Подписка отменена, сообщений больше не будет
    #[error("subscription is cancelled")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(TryRecvError::Empty.to_string(), "no messages available");
        assert_eq!(TryRecvError::Closed.to_string(), "subscription is cancelled");
    }
}
