//! BES upstream connection

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

use crate::error::ProxyError;

/// Request timeout for upstream calls. Management API queries can be slow
/// (large reports, busy root servers), so this is deliberately generous.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// BES connection configuration
#[derive(Clone, Debug)]
pub struct BesConnectionConfig {
    /// Base URL of the upstream BES server
    pub base_url: String,
    /// Username for HTTP Basic authentication
    pub username: String,
    /// Password for HTTP Basic authentication
    pub password: String,
    /// Skip TLS certificate verification (BES root servers typically
    /// present self-issued certificates)
    pub skip_tls_verify: bool,
}

/// A single authenticated connection to an upstream BES server.
///
/// A connection serves exactly one caller at a time while acquired from a
/// [`crate::ConnectionPool`]. Transport errors do not invalidate it; the
/// caller returns it to the pool and the next acquire tries again.
pub struct BesConnection {
    config: BesConnectionConfig,
    client: Client,
}

impl BesConnection {
    /// Create a new connection bound to one upstream's credentials
    pub fn new(config: BesConnectionConfig) -> Result<Self, ProxyError> {
        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);

        if config.skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build()?;

        Ok(Self { config, client })
    }

    /// The canonical base URL this connection is bound to
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Issue a GET to the full request URL with Basic auth and return the
    /// raw response bytes.
    ///
    /// Responses are bounded management API results, not streams, so the
    /// whole body is read into memory.
    pub async fn get(&self, url: &str) -> Result<Bytes, ProxyError> {
        debug!("Fetching upstream: {}", url);

        let response = self
            .client
            .get(url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.bytes().await?)
    }
}

impl std::fmt::Debug for BesConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BesConnection")
            .field("base_url", &self.config.base_url)
            .field("username", &self.config.username)
            .finish_non_exhaustive()
    }
}
