pub mod client;
pub mod network;
pub mod protocol;

// Публичный экспорт всех типов ошибок из вложенных модулей, чтобы упростить
// доступ к ним из внешнего кода.
pub use client::*;
pub use network::*;
pub use protocol::*;
