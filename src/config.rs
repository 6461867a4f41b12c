//! Listener configuration.
//!
//! Defaults match what producers assume out of the box: `127.0.0.1:9001`,
//! backlog 5, blocking accept. `VAR_SEND_HOST` / `VAR_SEND_PORT` override
//! host and port; command-line flags override both.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, VarSendError};
use crate::listener::AcceptMode;
use crate::poll::DEFAULT_POLL_INTERVAL;
use crate::protocol::MAX_FRAME_PAYLOAD;

/// Default listen host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 9001;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 5;

/// Environment variable overriding the host.
pub const HOST_ENV: &str = "VAR_SEND_HOST";

/// Environment variable overriding the port.
pub const PORT_ENV: &str = "VAR_SEND_PORT";

/// Everything needed to bind and run a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host name or IP address to bind.
    pub host: String,
    /// TCP port; 0 picks an ephemeral port.
    pub port: u16,
    /// Pending-connection queue length.
    pub backlog: u32,
    /// Accept discipline.
    pub accept_mode: AcceptMode,
    /// Largest payload a connection may announce.
    pub max_payload: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            accept_mode: AcceptMode::Blocking,
            max_payload: MAX_FRAME_PAYLOAD,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with `VAR_SEND_HOST` / `VAR_SEND_PORT`.
    ///
    /// # Errors
    ///
    /// Returns [`VarSendError::Config`] if a variable is set but invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup(HOST_ENV) {
            let host = host.trim();
            if host.is_empty() {
                return Err(VarSendError::Config(format!("{} is empty", HOST_ENV)));
            }
            config.host = host.to_string();
        }

        if let Some(port) = lookup(PORT_ENV) {
            config.port = port.trim().parse().map_err(|_| {
                VarSendError::Config(format!("{}={:?} is not a valid port", PORT_ENV, port))
            })?;
        }

        Ok(config)
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the listen backlog.
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Use blocking accept.
    pub fn blocking(mut self) -> Self {
        self.accept_mode = AcceptMode::Blocking;
        self
    }

    /// Use polling accept with the given interval.
    pub fn polling(mut self, interval: Duration) -> Self {
        self.accept_mode = AcceptMode::Polling { interval };
        self
    }

    /// Use polling accept at the default 10 ms interval.
    pub fn polling_default(self) -> Self {
        self.polling(DEFAULT_POLL_INTERVAL)
    }

    /// Limit the payload length a connection may announce.
    pub fn max_payload(mut self, max_payload: u32) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Resolve host and port to the address to bind.
    ///
    /// # Errors
    ///
    /// Returns [`VarSendError::Config`] if the host does not resolve.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        let target = (self.host.as_str(), self.port);
        let mut addrs = tokio::net::lookup_host(target).await.map_err(|e| {
            VarSendError::Config(format!("cannot resolve host {:?}: {}", self.host, e))
        })?;

        addrs.next().ok_or_else(|| {
            VarSendError::Config(format!("host {:?} resolved to no addresses", self.host))
        })
    }
}
