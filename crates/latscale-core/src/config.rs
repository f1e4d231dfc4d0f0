//! latscale.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::endpoint::{DEFAULT_HOST_ENV, DEFAULT_PORT_ENV, EndpointSource};
use crate::error::ConfigError;
use crate::types::Thresholds;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LatscaleConfig {
    pub thresholds: Thresholds,
    pub probe: ProbeConfig,
    pub controller: ControllerConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Fixed host; when unset it is read from `host_env` at sample time.
    pub host: Option<String>,
    /// Fixed port; when unset it is read from `port_env` at sample time.
    pub port: Option<u16>,
    pub host_env: String,
    pub port_env: String,
    pub path: String,
    /// Per-request timeout (e.g. "10s").
    pub timeout: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            host_env: DEFAULT_HOST_ENV.to_string(),
            port_env: DEFAULT_PORT_ENV.to_string(),
            path: "/".to_string(),
            timeout: "10s".to_string(),
        }
    }
}

impl ProbeConfig {
    pub fn endpoint_source(&self) -> EndpointSource {
        EndpointSource {
            host: self.host.clone(),
            port: self.port,
            host_env: self.host_env.clone(),
            port_env: self.port_env.clone(),
            path: self.path.clone(),
        }
    }

    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("probe.timeout", &self.timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Passes allowed to run at once across different workloads.
    pub max_concurrent_reconciles: usize,
    /// Delay before re-checking a workload after a scale action.
    pub scale_requeue: String,
    /// How often every stored workload is re-enqueued.
    pub resync_interval: String,
    /// First retry delay after a failed pass.
    pub error_backoff: String,
    /// Upper bound for the doubling retry delay.
    pub max_backoff: String,
    /// Consecutive failures before a workload is reported unhealthy.
    pub unhealthy_after: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: 2,
            scale_requeue: "5s".to_string(),
            resync_interval: "30s".to_string(),
            error_backoff: "1s".to_string(),
            max_backoff: "5m".to_string(),
            unhealthy_after: 3,
        }
    }
}

impl ControllerConfig {
    pub fn scale_requeue(&self) -> Result<Duration, ConfigError> {
        duration_field("controller.scale_requeue", &self.scale_requeue)
    }

    pub fn resync_interval(&self) -> Result<Duration, ConfigError> {
        duration_field("controller.resync_interval", &self.resync_interval)
    }

    pub fn error_backoff(&self) -> Result<Duration, ConfigError> {
        duration_field("controller.error_backoff", &self.error_backoff)
    }

    pub fn max_backoff(&self) -> Result<Duration, ConfigError> {
        duration_field("controller.max_backoff", &self.max_backoff)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8443 }
    }
}

impl LatscaleConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject configurations the controller must never run with.
    ///
    /// Endpoint presence is checked separately by the daemon because it
    /// depends on the process environment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_thresholds(&self.thresholds)?;

        if self.controller.max_concurrent_reconciles == 0 {
            return Err(ConfigError::Invalid {
                field: "controller.max_concurrent_reconciles",
                reason: "must be at least 1".to_string(),
            });
        }

        self.probe.timeout()?;
        self.controller.scale_requeue()?;
        let resync = self.controller.resync_interval()?;
        if resync.is_zero() {
            return Err(ConfigError::Invalid {
                field: "controller.resync_interval",
                reason: "must be non-zero".to_string(),
            });
        }
        let backoff = self.controller.error_backoff()?;
        let max_backoff = self.controller.max_backoff()?;
        if backoff > max_backoff {
            return Err(ConfigError::Invalid {
                field: "controller.error_backoff",
                reason: format!("{backoff:?} exceeds max_backoff {max_backoff:?}"),
            });
        }
        Ok(())
    }
}

/// Thresholds must be finite and must not overlap.
pub fn validate_thresholds(thresholds: &Thresholds) -> Result<(), ConfigError> {
    for (name, value) in [
        ("thresholds.scale_up", thresholds.scale_up),
        ("thresholds.scale_down", thresholds.scale_down),
    ] {
        if !value.is_finite() {
            return Err(ConfigError::NonFiniteThreshold { name, value });
        }
    }
    if thresholds.scale_down >= thresholds.scale_up {
        return Err(ConfigError::InvertedThresholds {
            scale_up: thresholds.scale_up,
            scale_down: thresholds.scale_down,
        });
    }
    Ok(())
}

fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

/// Parse a duration string like "5s", "500ms", "2m", or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
