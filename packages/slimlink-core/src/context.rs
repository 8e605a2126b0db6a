//! Server addressing shared across components.
//!
//! [`ServerContext`] bundles the server host and ports so that the
//! connection manager, the dispatcher (stream URLs) and the JSON-RPC client
//! all build addresses the same way.

use crate::config::ClientConfig;
use crate::protocol_constants::JSONRPC_PATH;

/// Where the server lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerContext {
    pub host: String,
    pub slimproto_port: u16,
    pub http_port: u16,
}

impl ServerContext {
    #[must_use]
    pub fn new(host: impl Into<String>, slimproto_port: u16, http_port: u16) -> Self {
        Self {
            host: host.into(),
            slimproto_port,
            http_port,
        }
    }

    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.server_host, config.slimproto_port, config.http_port)
    }

    /// `host:port` of the SlimProto socket, resolved at connect time.
    #[must_use]
    pub fn slimproto_addr(&self) -> String {
        format!("{}:{}", self.url_host(), self.slimproto_port)
    }

    /// URL of the JSON-RPC endpoint.
    #[must_use]
    pub fn jsonrpc_url(&self) -> String {
        format!("http://{}:{}{}", self.url_host(), self.http_port, JSONRPC_PATH)
    }

    /// Resolves a stream request path against the server.
    ///
    /// `port_override` is the port carried by the `strm` command; 0 keeps the
    /// configured HTTP port.
    #[must_use]
    pub fn stream_url(&self, path: &str, port_override: u16) -> String {
        let port = if port_override == 0 {
            self.http_port
        } else {
            port_override
        };
        format!("http://{}:{}{}", self.url_host(), port, path)
    }

    /// Host formatted for URLs (IPv6 literals bracketed).
    fn url_host(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}
