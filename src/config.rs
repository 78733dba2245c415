//! Shared-secret configuration.
//!
//! Loaded from TOML; the secret can be overridden through the
//! `SENSORSEAL_SECRET` environment variable so it does not have to live in
//! the file.
//!
//! ```toml
//! secret = "campus-orion-iot-secret-2024"
//! timestamp_tolerance_secs = 300
//! allow_unsigned = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::hmac::Signer;
use crate::sensor::{Verifier, VerifyPolicy, DEFAULT_TIMESTAMP_TOLERANCE};

/// Environment variable that replaces the configured secret.
pub const SECRET_ENV: &str = "SENSORSEAL_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no secret configured (set `secret` or SENSORSEAL_SECRET)")]
    MissingSecret,
    #[error("timestamp_tolerance_secs must be greater than zero")]
    InvalidTolerance,
}

fn default_tolerance_secs() -> u64 {
    DEFAULT_TIMESTAMP_TOLERANCE.as_secs()
}

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SealConfig {
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_tolerance_secs")]
    pub timestamp_tolerance_secs: u64,
    #[serde(default)]
    pub allow_unsigned: bool,
}

impl Default for SealConfig {
    fn default() -> Self {
        SealConfig {
            secret: String::new(),
            timestamp_tolerance_secs: default_tolerance_secs(),
            allow_unsigned: false,
        }
    }
}

impl core::fmt::Debug for SealConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SealConfig")
            .field("secret", &"<REDACTED>")
            .field("timestamp_tolerance_secs", &self.timestamp_tolerance_secs)
            .field("allow_unsigned", &self.allow_unsigned)
            .finish()
    }
}

impl SealConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SealConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Defaults plus whatever the environment provides.
    pub fn from_env() -> Self {
        let mut config = SealConfig::default();
        config.apply_env();
        config
    }

    /// Replace the secret with `SENSORSEAL_SECRET` when it is set.
    pub fn apply_env(&mut self) {
        self.apply_secret_override(std::env::var(SECRET_ENV).ok());
    }

    fn apply_secret_override(&mut self, value: Option<String>) {
        if let Some(secret) = value {
            tracing::debug!(var = SECRET_ENV, "Secret taken from environment");
            self.secret = secret;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timestamp_tolerance_secs == 0 {
            return Err(ConfigError::InvalidTolerance);
        }
        Ok(())
    }

    pub fn policy(&self) -> VerifyPolicy {
        VerifyPolicy {
            timestamp_tolerance: Duration::from_secs(self.timestamp_tolerance_secs),
            allow_unsigned: self.allow_unsigned,
        }
    }

    pub fn signer(&self) -> Result<Signer, ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        Ok(Signer::new(self.secret.as_bytes()))
    }

    pub fn verifier(&self) -> Result<Verifier, ConfigError> {
        self.validate()?;
        Ok(Verifier::new(self.signer()?, self.policy()))
    }
}
