//! Engine configuration loading and representation.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use gstkit_core::TaxRate;
use gstkit_returns::JurisdictionRules;

pub const ENV_LARGE_B2C_THRESHOLD: &str = "GST_LARGE_B2C_THRESHOLD";
pub const ENV_RATE_SLABS: &str = "GST_RATE_SLABS";
pub const ENV_FINALIZE_MAX_ATTEMPTS: &str = "GST_FINALIZE_MAX_ATTEMPTS";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

/// Jurisdiction parameters and runtime knobs.
///
/// The seller's base state is tenant data and is passed per call, not configured here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Unregistered inter-state invoices strictly above this go to their own section.
    pub large_b2c_threshold: Decimal,
    /// Permitted tax rates, in percent.
    pub rate_slabs: Vec<Decimal>,
    /// Read-then-decide attempts for invoice finalization before giving up.
    pub finalize_max_attempts: u32,
    /// Postgres connection string; in-memory repositories are used when absent.
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            large_b2c_threshold: Decimal::from(250_000),
            rate_slabs: [0, 5, 12, 18, 28].into_iter().map(Decimal::from).collect(),
            finalize_max_attempts: 3,
            database_url: None,
        }
    }
}

impl EngineConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`. Unset or blank variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = get(ENV_LARGE_B2C_THRESHOLD) {
            config.large_b2c_threshold = parse(ENV_LARGE_B2C_THRESHOLD, raw.trim())?;
        }
        if let Some(raw) = get(ENV_RATE_SLABS) {
            config.rate_slabs = raw
                .split(',')
                .map(|slab| parse(ENV_RATE_SLABS, slab.trim()))
                .collect::<Result<_, _>>()?;
        }
        if let Some(raw) = get(ENV_FINALIZE_MAX_ATTEMPTS) {
            config.finalize_max_attempts = parse(ENV_FINALIZE_MAX_ATTEMPTS, raw.trim())?;
        }
        config.database_url = get(ENV_DATABASE_URL);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.finalize_max_attempts == 0 {
            return Err(ConfigError::invalid(
                ENV_FINALIZE_MAX_ATTEMPTS,
                "at least one attempt is required",
            ));
        }
        self.jurisdiction().map(|_| ())
    }

    /// Threshold and slab list consumed by the calculator and the classifier.
    pub fn jurisdiction(&self) -> Result<JurisdictionRules, ConfigError> {
        if self.rate_slabs.is_empty() {
            return Err(ConfigError::invalid(ENV_RATE_SLABS, "at least one rate slab is required"));
        }
        let slabs = self
            .rate_slabs
            .iter()
            .map(|p| TaxRate::new(*p).map_err(|e| ConfigError::invalid(ENV_RATE_SLABS, e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        JurisdictionRules::new(self.large_b2c_threshold, slabs)
            .map_err(|e| ConfigError::invalid(ENV_LARGE_B2C_THRESHOLD, e.to_string()))
    }
}

fn parse<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| ConfigError::invalid(var, format!("'{raw}': {e}")))
}
