/// Client for the newsbus wire protocol.
pub mod client;
/// Server configuration loading.
pub mod config;
/// Common error types: configuration, logging, pub/sub.
pub mod error;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Network stack: JSON line protocol and Tokio-based server.
pub mod network;
/// News feed: events, store and resolvers on top of the bus.
pub mod news;
/// Pub/Sub: Broker, Subscription, Message.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Client API.
pub use client::{ClientConfig, NewsClient, SubscriptionEvent};
/// config
pub use crate::config::Settings;
/// Operation errors and status codes.
pub use error::{
    ClientError, ConfigError, ErrorExt, LoggingError, NetworkError, ProtocolError, StatusCode,
    TryRecvError,
};
/// Logging setup.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Network server and protocol.
pub use network::{protocol, server};
/// News feed API.
pub use news::{EventStore, FeedPayload, NewsEvent, NewsService, SubscriptionField};
/// Pub/Sub API.
pub use pubsub::{
    Broker, CancelHandle, ChannelConfig, Message, OverflowPolicy, Subscription, Topic,
};
