//! Probe endpoint resolution.
//!
//! The target service's address is usually injected into the controller's
//! environment as a host/port pair. Resolution happens at sample time so a
//! restarted service with a new address is picked up without a restart.

use std::fmt;

use crate::error::ProbeError;

/// Default environment variable holding the probed service's host.
pub const DEFAULT_HOST_ENV: &str = "WEBSERVER_SERVICE_SERVICE_HOST";

/// Default environment variable holding the probed service's port.
pub const DEFAULT_PORT_ENV: &str = "WEBSERVER_SERVICE_SERVICE_PORT";

/// A resolved probe target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Request path, always starting with `/`.
    pub path: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: "/".to_string(),
        }
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}{}", self.authority(), self.path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Where to find the probe endpoint.
///
/// Explicit `host`/`port` values win; anything left unset is read from the
/// named environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSource {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub host_env: String,
    pub port_env: String,
    pub path: String,
}

impl Default for EndpointSource {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            host_env: DEFAULT_HOST_ENV.to_string(),
            port_env: DEFAULT_PORT_ENV.to_string(),
            path: "/".to_string(),
        }
    }
}

impl EndpointSource {
    /// A fixed endpoint that never consults the environment.
    pub fn fixed(endpoint: &Endpoint) -> Self {
        Self {
            host: Some(endpoint.host.clone()),
            port: Some(endpoint.port),
            path: endpoint.path.clone(),
            ..Self::default()
        }
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> Result<Endpoint, ProbeError> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve using `lookup` for environment values.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<Endpoint, ProbeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = match &self.host {
            Some(host) => host.clone(),
            None => lookup(&self.host_env)
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .ok_or_else(|| ProbeError::Unreachable(format!("{} is not set", self.host_env)))?,
        };

        let port = match self.port {
            Some(port) => port,
            None => {
                let raw = lookup(&self.port_env).ok_or_else(|| {
                    ProbeError::Unreachable(format!("{} is not set", self.port_env))
                })?;
                raw.trim().parse::<u16>().map_err(|_| {
                    ProbeError::Unreachable(format!("{} is not a valid port: {raw:?}", self.port_env))
                })?
            }
        };

        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        Ok(Endpoint { host, port, path })
    }
}
