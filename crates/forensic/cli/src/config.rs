//! Configuration for the forensic CLI

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use forensic_completion::transport::{DEFAULT_AUTH_ENV_VAR, DEFAULT_ENDPOINT};
use forensic_engine::content::DEFAULT_CONTENT_GATEWAY;
use forensic_engine::{ResolverConfig, StageModels};
use forensic_guard::{GuardConfig, MAX_COOLDOWN_SECS};
use forensic_types::JURY_SIZE;
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForensicConfig {
    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub resolver: ResolverSettings,

    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub sweep: SweepConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub content: ContentConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scoring service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub endpoint: String,
    /// Environment variable holding the bearer token
    pub api_key_env: String,
    pub silo_model: String,
    pub jury_model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Per-call bound, request to final fragment
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        let models = StageModels::default();
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key_env: DEFAULT_AUTH_ENV_VAR.to_string(),
            silo_model: models.silo_model,
            jury_model: models.jury_model,
            temperature: models.temperature,
            max_tokens: models.max_tokens,
            request_timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

impl CompletionConfig {
    pub fn stage_models(&self) -> StageModels {
        StageModels {
            silo_model: self.silo_model.clone(),
            jury_model: self.jury_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Score resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub min_severity_samples: usize,
    /// Jurors the jury prompt asks for
    pub jury_size: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            min_severity_samples: ResolverConfig::default().min_severity_samples,
            jury_size: JURY_SIZE,
        }
    }
}

impl ResolverSettings {
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            min_severity_samples: self.min_severity_samples,
        }
    }
}

/// Batch sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Pause after a failed recipe before the next one
    pub failure_backoff_secs: u64,
    /// Recipes audited ahead of the commit cursor
    pub audit_concurrency: usize,
    pub watch_interval_secs: u64,
    /// JSON-lines archive of every finished session
    pub session_log: Option<PathBuf>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            failure_backoff_secs: 5,
            audit_concurrency: 2,
            watch_interval_secs: 30,
            session_log: None,
        }
    }
}

impl SweepConfig {
    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs.max(1))
    }
}

/// Ledger gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// REST gateway; unset runs against an empty in-memory ledger
    pub gateway_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            request_timeout_secs: 30,
        }
    }
}

/// Content store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub gateway_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_CONTENT_GATEWAY.to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ForensicConfig {
    /// Defaults, then the optional file, then `FORENSIC__SECTION__KEY` variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&ForensicConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FORENSIC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject settings the pipeline cannot honor.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.resolver.jury_size != JURY_SIZE {
            bail!(
                "resolver.jury_size is {}, but the jury panel is fixed at {}",
                self.resolver.jury_size,
                JURY_SIZE
            );
        }
        if self.resolver.min_severity_samples == 0 {
            bail!("resolver.min_severity_samples must be at least 1");
        }
        if self.guard.cooldown_secs > MAX_COOLDOWN_SECS {
            bail!(
                "guard.cooldown_secs is {}, above the limit of {}",
                self.guard.cooldown_secs,
                MAX_COOLDOWN_SECS
            );
        }
        if self.guard.strike_threshold_bps > 10_000 {
            bail!(
                "guard.strike_threshold_bps {} is outside 0..=10000",
                self.guard.strike_threshold_bps
            );
        }
        if self.guard.max_write_attempts == 0 {
            bail!("guard.max_write_attempts must be at least 1");
        }
        if self.sweep.audit_concurrency == 0 {
            bail!("sweep.audit_concurrency must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            bail!(
                "completion.temperature {} is outside 0.0..=2.0",
                self.completion.temperature
            );
        }
        Ok(())
    }

    pub fn load_validated(path: Option<&str>) -> anyhow::Result<Self> {
        let config = Self::load(path).context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }
}
