//! Pool configuration types.

use crate::error::ConfigError;
use crate::provisioner::PluginRequirement;
use std::time::Duration;

/// Timings for the readiness prober.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Base URL of the host the control ports are published on.
    pub runtime_url: String,
    /// Path of the liveness endpoint on the control server.
    pub liveness_path: String,
    /// Delay between two probes (default: 2 seconds).
    pub poll_interval: Duration,
    /// Total time allowed for a sandbox to become ready (default: 60 seconds).
    pub max_wait: Duration,
    /// Timeout of a single liveness request (default: 5 seconds).
    pub request_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            runtime_url: "http://localhost".to_string(),
            liveness_path: "/alive".to_string(),
            poll_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(60),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ProbeConfig {
    /// Validate the probe configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.runtime_url.starts_with("http://") {
            return Err(ConfigError::InvalidRuntimeUrl(self.runtime_url.clone()));
        }
        if !self.liveness_path.starts_with('/') {
            return Err(ConfigError::InvalidLivenessPath(self.liveness_path.clone()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("poll_interval"));
        }
        if self.max_wait.is_zero() {
            return Err(ConfigError::ZeroDuration("max_wait"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request_timeout"));
        }
        Ok(())
    }
}

/// Configuration for the sandbox pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of free sandboxes to keep ready.
    ///
    /// Zero disables pooling: every reservation misses and nothing is created.
    /// Default: 0
    pub target_size: usize,

    /// Plugins installed in every pooled sandbox.
    ///
    /// Default: `agent_skills`, `jupyter`
    pub plugins: Vec<PluginRequirement>,

    /// Maximum number of creations attempted in one fill pass.
    ///
    /// Default: 3
    pub max_batch: usize,

    /// Interval between maintenance passes.
    ///
    /// Default: 30 seconds
    pub maintenance_interval: Duration,

    /// Cooldown after a fill pass in which every creation failed.
    ///
    /// Default: 300 seconds
    pub failure_backoff: Duration,

    /// Name prefix of pooled sandboxes, followed by the entry id.
    pub pool_prefix: String,

    /// Name prefix of claimed sandboxes, followed by the claimant id.
    pub claim_prefix: String,

    /// Readiness probe timings.
    pub probe: ProbeConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            target_size: 0,
            plugins: vec![
                PluginRequirement::new("agent_skills"),
                PluginRequirement::new("jupyter"),
            ],
            max_batch: 3,
            maintenance_interval: Duration::from_secs(30),
            failure_backoff: Duration::from_secs(300),
            pool_prefix: "sandbox-pool-".to_string(),
            claim_prefix: "sandbox-runtime-".to_string(),
            probe: ProbeConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Create a new config builder.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Whether pooling is enabled at all.
    pub fn is_enabled(&self) -> bool {
        self.target_size > 0
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch == 0 {
            return Err(ConfigError::ZeroBatch);
        }
        if self.maintenance_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("maintenance_interval"));
        }
        self.probe.validate()
    }
}

/// Builder for PoolConfig.
#[derive(Debug, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Set the target number of free sandboxes.
    pub fn target_size(mut self, size: usize) -> Self {
        self.config.target_size = size;
        self
    }

    /// Replace the plugin list.
    pub fn plugins(mut self, plugins: impl IntoIterator<Item = PluginRequirement>) -> Self {
        self.config.plugins = plugins.into_iter().collect();
        self
    }

    /// Set the per-pass creation ceiling.
    pub fn max_batch(mut self, max_batch: usize) -> Self {
        self.config.max_batch = max_batch;
        self
    }

    /// Set the maintenance interval.
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.config.maintenance_interval = interval;
        self
    }

    /// Set the failure backoff window.
    pub fn failure_backoff(mut self, backoff: Duration) -> Self {
        self.config.failure_backoff = backoff;
        self
    }

    /// Set the pooled/claimed name prefixes.
    pub fn name_prefixes(mut self, pool: impl Into<String>, claim: impl Into<String>) -> Self {
        self.config.pool_prefix = pool.into();
        self.config.claim_prefix = claim.into();
        self
    }

    /// Set the readiness probe configuration.
    pub fn probe(mut self, probe: ProbeConfig) -> Self {
        self.config.probe = probe;
        self
    }

    /// Build the configuration, validating all fields.
    pub fn build(self) -> Result<PoolConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
