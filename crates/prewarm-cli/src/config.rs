//! Configuration for the prewarm daemon.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use prewarm_core::{PluginRequirement, PoolConfig, ProbeConfig};
use prewarm_docker::DockerConfig;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the prewarm daemon.
#[derive(Debug, Clone)]
pub struct PrewarmConfig {
    /// Free sandboxes to keep ready; 0 disables pooling (default: 2).
    pub pool_size: usize,

    /// Plugins installed in every pooled sandbox.
    pub plugins: Vec<String>,

    /// Maximum creations per fill pass (default: 3).
    pub max_batch: usize,

    /// Delay between maintenance passes (default: 30s).
    pub maintenance_interval: Duration,

    /// Pause after a fill pass that created nothing (default: 300s).
    pub failure_backoff: Duration,

    /// Readiness deadline for a new sandbox (default: 60s).
    pub ready_timeout: Duration,

    /// Delay between readiness probes (default: 2s).
    pub ready_poll: Duration,

    /// Runtime image (no default).
    pub image: Option<String>,

    /// Path to the docker binary.
    pub docker_path: PathBuf,

    /// Address published ports bind to.
    pub bind_address: String,

    /// Use host networking instead of publishing ports.
    pub host_network: bool,

    /// Base URL for reaching control ports.
    pub runtime_url: String,

    /// Delay between two stats log lines (default: 60s).
    pub stats_interval: Duration,
}

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("PREWARM_IMAGE is not set")]
    MissingImage,

    #[error("bind address is not an IP address: {0}")]
    InvalidBindAddress(String),

    #[error("stats interval must be greater than zero")]
    ZeroStatsInterval,

    #[error(transparent)]
    Pool(#[from] prewarm_core::ConfigError),
}

impl Default for PrewarmConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            plugins: vec!["agent_skills".into(), "jupyter".into()],
            max_batch: 3,
            maintenance_interval: Duration::from_secs(30),
            failure_backoff: Duration::from_secs(300),
            ready_timeout: Duration::from_secs(60),
            ready_poll: Duration::from_secs(2),
            image: None,
            docker_path: PathBuf::from("docker"),
            bind_address: "0.0.0.0".into(),
            host_network: false,
            runtime_url: "http://localhost".into(),
            stats_interval: Duration::from_secs(60),
        }
    }
}

impl PrewarmConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PREWARM_POOL_SIZE` | `2` |
    /// | `PREWARM_PLUGINS` | `agent_skills,jupyter` |
    /// | `PREWARM_MAX_BATCH` | `3` |
    /// | `PREWARM_MAINTENANCE_SECS` | `30` |
    /// | `PREWARM_BACKOFF_SECS` | `300` |
    /// | `PREWARM_READY_TIMEOUT_SECS` | `60` |
    /// | `PREWARM_READY_POLL_SECS` | `2` |
    /// | `PREWARM_IMAGE` | unset |
    /// | `PREWARM_DOCKER` | `docker` |
    /// | `PREWARM_BIND_ADDRESS` | `0.0.0.0` |
    /// | `PREWARM_HOST_NETWORK` | `false` |
    /// | `PREWARM_RUNTIME_URL` | `http://localhost` |
    /// | `PREWARM_STATS_SECS` | `60` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        let parsed = |key: &str, fallback| parse_or(lookup(key), fallback);
        let secs = |key: &str, fallback: Duration| {
            Duration::from_secs(parse_or(lookup(key), fallback.as_secs()))
        };

        Self {
            pool_size: parsed("PREWARM_POOL_SIZE", default.pool_size),
            plugins: lookup("PREWARM_PLUGINS")
                .map(|v| parse_list(&v))
                .unwrap_or(default.plugins),
            max_batch: parsed("PREWARM_MAX_BATCH", default.max_batch),
            maintenance_interval: secs("PREWARM_MAINTENANCE_SECS", default.maintenance_interval),
            failure_backoff: secs("PREWARM_BACKOFF_SECS", default.failure_backoff),
            ready_timeout: secs("PREWARM_READY_TIMEOUT_SECS", default.ready_timeout),
            ready_poll: secs("PREWARM_READY_POLL_SECS", default.ready_poll),
            image: lookup("PREWARM_IMAGE").filter(|v| !v.trim().is_empty()),
            docker_path: lookup("PREWARM_DOCKER")
                .map(PathBuf::from)
                .unwrap_or(default.docker_path),
            bind_address: lookup("PREWARM_BIND_ADDRESS").unwrap_or(default.bind_address),
            host_network: lookup("PREWARM_HOST_NETWORK")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(default.host_network),
            runtime_url: lookup("PREWARM_RUNTIME_URL").unwrap_or(default.runtime_url),
            stats_interval: secs("PREWARM_STATS_SECS", default.stats_interval),
        }
    }

    /// Pool configuration derived from these settings.
    pub fn pool_config(&self) -> Result<PoolConfig, prewarm_core::ConfigError> {
        let probe = ProbeConfig {
            runtime_url: self.runtime_url.clone(),
            poll_interval: self.ready_poll,
            max_wait: self.ready_timeout,
            ..ProbeConfig::default()
        };
        PoolConfig::builder()
            .target_size(self.pool_size)
            .plugins(self.plugins.iter().map(PluginRequirement::new))
            .max_batch(self.max_batch)
            .maintenance_interval(self.maintenance_interval)
            .failure_backoff(self.failure_backoff)
            .probe(probe)
            .build()
    }

    /// Docker provisioner configuration derived from these settings.
    pub fn docker_config(&self) -> DockerConfig {
        DockerConfig {
            docker_path: self.docker_path.clone(),
            image: self.image.clone(),
            bind_address: self.bind_address.clone(),
            use_host_network: self.host_network,
            ..DockerConfig::default()
        }
    }

    /// Period of the stats log line; never zero.
    pub fn stats_every(&self) -> Result<Duration, ConfigError> {
        if self.stats_interval.is_zero() {
            return Err(ConfigError::ZeroStatsInterval);
        }
        Ok(self.stats_interval)
    }

    /// Validate the configuration.
    ///
    /// Call this at startup to get clear error messages.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.is_none() {
            return Err(ConfigError::MissingImage);
        }
        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(ConfigError::InvalidBindAddress(self.bind_address.clone()));
        }
        self.stats_every()?;
        self.pool_config()?;
        Ok(())
    }

    /// Validate configuration but only log warnings instead of failing.
    ///
    /// Without an image every creation fails and the pool backs off, so the
    /// daemon can still run for development.
    pub fn validate_warn(&self) {
        if let Err(e) = self.validate() {
            tracing::warn!(error = %e, "Configuration problem");
        }
        if self.pool_size == 0 {
            tracing::warn!("PREWARM_POOL_SIZE is 0, pooling disabled");
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, fallback: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(fallback)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
