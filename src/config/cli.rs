use clap::Parser;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use super::{
    ConfigError,
    types::{LogLevel, TransportKind},
};

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub listen_addr: SocketAddr,
    pub config_file_location: Option<PathBuf>,
    pub log_level: LogLevel,
    pub transport: Option<TransportKind>,
}

impl CliConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = Args::try_parse().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Self::from_parsed(args)
    }

    pub fn try_from_iter<I, T>(iter: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let args = Args::try_parse_from(iter).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Self::from_parsed(args)
    }
}

// -----------------------------------------------------------------------------
// ----- CliConfig: Private ----------------------------------------------------

impl CliConfig {
    fn from_parsed(args: Args) -> Result<Self, ConfigError> {
        let cfg = Self {
            listen_addr: SocketAddr::from((args.host, args.port)),
            config_file_location: args.config_file,
            log_level: args.log_level,
            transport: args.transport,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.config_file_location else {
            return Ok(());
        };

        if !path.is_file() {
            return Err(ConfigError::Invalid(format!(
                "config file not found: {} (from --config / POOLRELAY_CONFIG_FILE)",
                path.display()
            )));
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "poolrelay", version, about = "Stateless HTTP relay to a line-protocol mining pool")]
struct Args {
    // IPv4 or IPv6 literal to bind the HTTP surface on.
    #[arg(long = "host", short = 'H', env = "POOLRELAY_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    host: IpAddr,

    #[arg(long = "port", short = 'p', env = "POOLRELAY_PORT", default_value_t = 10000)]
    port: u16,

    #[arg(long = "log", env = "POOLRELAY_LOG", default_value = "info")]
    log_level: LogLevel,

    // Optional; every tuning key has a default.
    #[arg(long = "config", env = "POOLRELAY_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    // Overrides [pool].transport from the file.
    #[arg(long = "transport", env = "POOLRELAY_TRANSPORT")]
    transport: Option<TransportKind>,
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
