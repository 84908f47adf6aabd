//! Runtime settings.
//!
//! Sources, later ones winning:
//! 1. built-in defaults (every field has one)
//! 2. `config/boxflow.toml` if present
//! 3. environment variables `BOXFLOW__<SECTION>__<FIELD>`,
//!    e.g. `BOXFLOW__PACKING__OVER_PACKING=reject`

use anyhow::Context;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use boxflow_distribution::PackingPolicy;
use boxflow_observability::LoggingSettings;

use crate::idempotency::{self, IdempotencyRecords};

pub const CONFIG_FILE: &str = "config/boxflow";
pub const ENV_PREFIX: &str = "BOXFLOW";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts for commands failing with `ConcurrentModification`.
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencySettings {
    /// How long a key is remembered after its command committed.
    pub ttl_secs: u64,
    /// Keys kept at most; the oldest go first.
    pub max_entries: usize,
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            ttl_secs: idempotency::DEFAULT_TTL_SECS as u64,
            max_entries: idempotency::DEFAULT_CAPACITY,
        }
    }
}

impl IdempotencySettings {
    pub fn records(&self) -> IdempotencyRecords {
        let ttl = self.ttl_secs.min(i64::MAX as u64 / 1_000) as i64;
        IdempotencyRecords::new(chrono::Duration::seconds(ttl), self.max_entries)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub packing: PackingPolicy,
    pub retry: RetrySettings,
    pub idempotency: IdempotencySettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load from the default file and the environment.
    pub fn load() -> anyhow::Result<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        Self::build(builder).context("loading boxflow settings")
    }

    /// Load from a TOML document (defaults fill the gaps).
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        if settings.retry.max_attempts == 0 {
            return Err(ConfigError::Message(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if settings.idempotency.ttl_secs == 0 || settings.idempotency.max_entries == 0 {
            return Err(ConfigError::Message(
                "idempotency.ttl_secs and idempotency.max_entries must be at least 1".to_string(),
            ));
        }
        Ok(settings)
    }
}
