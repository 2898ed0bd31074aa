use serde::Deserialize;
use std::{path::Path, time::Duration};
use tokio::fs;

use super::{
    ConfigError,
    types::{TransportKind, WebSocketScheme},
};

// -----------------------------------------------------------------------------
// ----- Defaults --------------------------------------------------------------

pub const DEFAULT_LOCATOR_URL: &str = "https://server.duinocoin.com/getPool";
pub const DEFAULT_FALLBACK_HOST: &str = "149.91.88.18";
pub const DEFAULT_FALLBACK_PORT: u16 = 2813;
pub const DEFAULT_PROTOCOL_VERSION: &str = "3.0";

// -----------------------------------------------------------------------------
// ----- RelaySettings ---------------------------------------------------------

/// Everything tunable about the relay core. Loaded from an optional TOML file;
/// every key has a default.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySettings {
    pub pool: PoolSettings,
    pub session: SessionSettings,
    pub handshake: HandshakeSettings,
    pub protocol: ProtocolSettings,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Set to an empty string to skip the lookup and always use the fallback.
    pub locator_url: String,
    #[serde(deserialize_with = "de_duration")]
    pub locator_timeout: Duration,
    pub fallback_host: String,
    pub fallback_port: u16,
    pub transport: TransportKind,
    pub websocket_scheme: WebSocketScheme,
    pub websocket_path: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    #[serde(deserialize_with = "de_duration")]
    pub ttl: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub connect_timeout: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub receive_timeout: Duration,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HandshakeSettings {
    #[serde(deserialize_with = "de_duration")]
    pub timeout: Duration,
    /// Leading lines inspected for a version token before giving up.
    pub max_lines: usize,
    pub max_version_len: usize,
    pub default_version: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolSettings {
    pub difficulty_tag: String,
    /// Reads allowed per job request while skipping chatter.
    pub job_attempts: usize,
    /// Case-insensitive substrings that mark a line as chatter.
    pub chatter_markers: Vec<String>,
}

// -----------------------------------------------------------------------------
// ----- Defaults: impls -------------------------------------------------------

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            locator_url: DEFAULT_LOCATOR_URL.to_string(),
            locator_timeout: Duration::from_secs(10),
            fallback_host: DEFAULT_FALLBACK_HOST.to_string(),
            fallback_port: DEFAULT_FALLBACK_PORT,
            transport: TransportKind::Tcp,
            websocket_scheme: WebSocketScheme::Ws,
            websocket_path: "/".to_string(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            connect_timeout: Duration::from_secs(30),
            receive_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_lines: 3,
            max_version_len: 10,
            default_version: DEFAULT_PROTOCOL_VERSION.to_string(),
        }
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            difficulty_tag: "LOW".to_string(),
            job_attempts: 3,
            chatter_markers: vec!["motd".into(), "notice".into(), "message".into()],
        }
    }
}

// -----------------------------------------------------------------------------
// ----- RelaySettings: Static -------------------------------------------------

impl RelaySettings {
    pub async fn from_file_async(path: &Path) -> Result<RelaySettings, ConfigError> {
        let raw = fs::read_to_string(path).await.map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<RelaySettings, ConfigError> {
        let settings: RelaySettings =
            toml::from_str(raw).map_err(|e| ConfigError::Toml { source: e })?;
        settings.validate()?;
        Ok(settings)
    }
}

// -----------------------------------------------------------------------------
// ----- RelaySettings: Private ------------------------------------------------

impl RelaySettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.fallback_host.trim().is_empty() {
            return Err(ConfigError::InvalidField("pool.fallback_host".into()));
        }
        if self.pool.fallback_port == 0 {
            return Err(ConfigError::InvalidField("pool.fallback_port".into()));
        }
        if self.session.ttl.is_zero() {
            return Err(ConfigError::InvalidField("session.ttl".into()));
        }
        if self.handshake.max_lines == 0 {
            return Err(ConfigError::InvalidField("handshake.max_lines".into()));
        }
        if self.handshake.default_version.is_empty() {
            return Err(ConfigError::InvalidField("handshake.default_version".into()));
        }
        if self.protocol.job_attempts == 0 {
            return Err(ConfigError::InvalidField("protocol.job_attempts".into()));
        }
        if self.protocol.difficulty_tag.contains(',') {
            return Err(ConfigError::InvalidField("protocol.difficulty_tag".into()));
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

/// Accepts humantime strings ("5m", "30s") or integer milliseconds.
fn de_duration<'de, D>(d: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{Error, Unexpected, Visitor};
    use std::fmt;

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration like \"30s\" / \"5m\" or integer milliseconds")
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Duration::from_millis(v))
        }

        fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
            if v < 0 {
                return Err(E::invalid_value(Unexpected::Signed(v), &self));
            }
            Ok(Duration::from_millis(v as u64))
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
            humantime::parse_duration(v).map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
        }
    }

    d.deserialize_any(DurationVisitor)
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
