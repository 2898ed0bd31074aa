use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use poolrelay::{Config, Relay, api};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "⛏️ poolrelay";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let config = match setup().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{APP_NAME}: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{} stopped: {e}", APP_NAME);
            ExitCode::FAILURE
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() -> Result<Config, poolrelay::config::ConfigError> {
    // Config comes first so the log level is known before tracing starts
    let config = Config::load().await?;

    init_tracing(&config);

    Ok(config)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run(config: Config) -> std::io::Result<()> {
    let relay = Arc::new(Relay::from_settings(&config.relay));

    info!(
        transport = config.transport().as_str(),
        ttl = %humantime::format_duration(config.relay.session.ttl),
        "{} starting",
        APP_NAME
    );

    let served = api::serve(config.listen_addr, relay.clone(), shutdown_signal()).await;

    let closed = relay.shutdown().await;
    info!("{} shut down, closed {closed} pool sessions", APP_NAME);

    served
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
