use serde::Deserialize;

// -----------------------------------------------------------------------------
// ----- LogLevel --------------------------------------------------------------

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// -----------------------------------------------------------------------------
// ----- TransportKind ---------------------------------------------------------

/// Which duplex channel to open towards the pool. Chosen by deployment, never negotiated.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    #[value(alias = "ws")]
    #[serde(alias = "ws")]
    Websocket,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Websocket => "websocket",
        }
    }
}

// -----------------------------------------------------------------------------
// ----- WebSocketScheme -------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WebSocketScheme {
    #[default]
    Ws,
    Wss,
}

impl WebSocketScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            WebSocketScheme::Ws => "ws",
            WebSocketScheme::Wss => "wss",
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
