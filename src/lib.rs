pub mod api;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod locator;
pub mod protocol;
pub mod relay;
pub mod transport;

pub use config::Config;
pub use errors::{RelayError, RelayResult, TransportError};
pub use relay::{Outcome, Relay};
