pub mod config;
pub mod logging;
pub mod pubsub;

// Publicly re-export all error types from the submodules to simplify access
// from external code.
pub use self::config::ConfigError;
pub use self::logging::LoggingError;
pub use newsbus_error::{ClientError, ErrorExt, NetworkError, ProtocolError, StatusCode};
pub use pubsub::TryRecvError;
