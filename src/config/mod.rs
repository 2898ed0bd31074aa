pub mod cli;
#[allow(clippy::module_inception)]
pub mod config;
pub mod relay;
pub mod types;

pub use config::{Config, ConfigError};
pub use relay::{HandshakeSettings, PoolSettings, ProtocolSettings, RelaySettings, SessionSettings};
pub use types::{LogLevel, TransportKind, WebSocketScheme};
