//! Upstream endpoint discovery.
//!
//! The pool advertises its current address over a one-shot HTTP lookup.
//! Resolution never fails observably: any problem with the lookup yields the
//! configured fallback, and an unreachable fallback surfaces later as a
//! connect error.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PoolSettings;

// -----------------------------------------------------------------------------
// ----- PoolEndpoint ----------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolEndpoint {
    pub host: String,
    pub port: u16,
}

impl PoolEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PoolEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// -----------------------------------------------------------------------------
// ----- PoolLocator -----------------------------------------------------------

#[async_trait]
pub trait PoolLocator: Send + Sync {
    /// Resolve the endpoint for one connect attempt. Never cached by callers.
    async fn resolve(&self) -> PoolEndpoint;
}

pub fn from_settings(settings: &PoolSettings) -> Arc<dyn PoolLocator> {
    let fallback = PoolEndpoint::new(settings.fallback_host.clone(), settings.fallback_port);

    if settings.locator_url.trim().is_empty() {
        return Arc::new(StaticPoolLocator::new(fallback));
    }

    Arc::new(HttpPoolLocator::new(
        settings.locator_url.clone(),
        settings.locator_timeout,
        fallback,
    ))
}

// -----------------------------------------------------------------------------
// ----- StaticPoolLocator -----------------------------------------------------

#[derive(Clone, Debug)]
pub struct StaticPoolLocator {
    endpoint: PoolEndpoint,
}

impl StaticPoolLocator {
    pub fn new(endpoint: PoolEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl PoolLocator for StaticPoolLocator {
    async fn resolve(&self) -> PoolEndpoint {
        self.endpoint.clone()
    }
}

// -----------------------------------------------------------------------------
// ----- HttpPoolLocator -------------------------------------------------------

#[derive(Clone, Debug)]
pub struct HttpPoolLocator {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
    fallback: PoolEndpoint,
}

impl HttpPoolLocator {
    pub fn new(url: impl Into<String>, timeout: Duration, fallback: PoolEndpoint) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            timeout,
            fallback,
        }
    }

    async fn lookup(&self) -> Result<PoolEndpoint, String> {
        let response = self
            .http
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("lookup returned HTTP {status}"));
        }

        let body: GetPoolResponse = response
            .json()
            .await
            .map_err(|e| format!("malformed lookup response: {e}"))?;

        body.into_endpoint(self.fallback.port)
    }
}

#[async_trait]
impl PoolLocator for HttpPoolLocator {
    async fn resolve(&self) -> PoolEndpoint {
        match self.lookup().await {
            Ok(endpoint) => {
                debug!(%endpoint, "pool lookup succeeded");
                endpoint
            }
            Err(reason) => {
                warn!(fallback = %self.fallback, "pool lookup failed, using fallback: {reason}");
                self.fallback.clone()
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Lookup response ---------------------------------------------

#[derive(Debug, Deserialize)]
struct GetPoolResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    port: Option<u16>,
}

impl GetPoolResponse {
    fn into_endpoint(self, default_port: u16) -> Result<PoolEndpoint, String> {
        if !self.success {
            return Err("lookup reported success=false".to_string());
        }

        let host = self
            .ip
            .filter(|ip| !ip.trim().is_empty())
            .ok_or_else(|| "lookup response has no ip".to_string())?;

        Ok(PoolEndpoint::new(host, self.port.unwrap_or(default_port)))
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
