use std::{net::SocketAddr, path::PathBuf};

use thiserror::Error;

use super::{
    cli::CliConfig,
    relay::RelaySettings,
    types::{LogLevel, TransportKind},
};

// -----------------------------------------------------------------------------
// ----- Config ----------------------------------------------------------------

/// Fully assembled process configuration. Built once in `main` and handed to
/// constructors; nothing reads it from a global.
#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: LogLevel,
    pub relay: RelaySettings,
}

// -----------------------------------------------------------------------------
// ----- Config: Static --------------------------------------------------------

impl Config {
    /// Async because the tuning file is read with non-blocking IO.
    pub async fn load() -> Result<Config, ConfigError> {
        let cli = CliConfig::from_args()?;
        Self::from_cli(cli).await
    }

    pub async fn from_cli(cli: CliConfig) -> Result<Config, ConfigError> {
        let relay = match &cli.config_file_location {
            Some(path) => RelaySettings::from_file_async(path).await?,
            None => RelaySettings::default(),
        };

        Ok(Self::assemble(cli, relay))
    }
}

// -----------------------------------------------------------------------------
// ----- Config: Public --------------------------------------------------------

impl Config {
    pub fn transport(&self) -> TransportKind {
        self.relay.pool.transport
    }
}

// -----------------------------------------------------------------------------
// ----- Config: Private -------------------------------------------------------

impl Config {
    fn assemble(cli: CliConfig, mut relay: RelaySettings) -> Config {
        // CLI wins over the file for the transport kind.
        if let Some(kind) = cli.transport {
            relay.pool.transport = kind;
        }

        Config {
            listen_addr: cli.listen_addr,
            log_level: cli.log_level,
            relay,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid or missing field '{0}'")]
    InvalidField(String),

    #[error("read error for {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
