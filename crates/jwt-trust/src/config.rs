//! Key store configuration.

use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::env::Environment;
use crate::{Error, Result};

/// Prefix of the environment variables holding per-issuer public keys.
pub const DEFAULT_ISSUER_ENV_PREFIX: &str = "JWT_PUBLIC_KEY_";

/// Keys directory used when none is configured.
pub const DEFAULT_KEYS_DIRECTORY: &str = "storage/jwt";

/// Where keys live and which secret backs HMAC signing.
#[derive(Debug)]
pub struct JwtConfig {
    /// Directory scanned for `jwt.*.key` and `jwt.*.key.pub` files.
    pub keys_directory: PathBuf,

    /// Shared HMAC secret. Used for signing when no private key file exists and
    /// always tried last during verification.
    pub secret: SecretString,

    /// Prepended to the normalized issuer to form the trust variable name.
    pub issuer_env_prefix: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    keys_directory: Option<PathBuf>,
    secret: String,
    issuer_env_prefix: Option<String>,
}

impl JwtConfig {
    /// Build a config with the default issuer prefix.
    pub fn new(keys_directory: impl Into<PathBuf>, secret: impl Into<String>) -> Self {
        let secret: String = secret.into();
        Self {
            keys_directory: keys_directory.into(),
            secret: SecretString::from(secret),
            issuer_env_prefix: DEFAULT_ISSUER_ENV_PREFIX.to_string(),
        }
    }

    /// Override the issuer variable prefix.
    #[must_use]
    pub fn with_issuer_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.issuer_env_prefix = prefix.into();
        self
    }

    /// Load from a TOML file.
    ///
    /// A relative `keys_directory` is resolved against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let mut cfg = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;

        if cfg.keys_directory.is_relative() {
            if let Some(parent) = path.parent() {
                cfg.keys_directory = parent.join(&cfg.keys_directory);
            }
        }
        Ok(cfg)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("invalid TOML: {e}")))?;
        let cfg = Self {
            keys_directory: raw
                .keys_directory
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KEYS_DIRECTORY)),
            secret: SecretString::from(raw.secret),
            issuer_env_prefix: raw
                .issuer_env_prefix
                .unwrap_or_else(|| DEFAULT_ISSUER_ENV_PREFIX.to_string()),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read `JWT_SECRET`, `JWT_KEYS_DIRECTORY` and `JWT_ISSUER_ENV_PREFIX`.
    pub fn from_env(env: &impl Environment) -> Result<Self> {
        let secret = env
            .var("JWT_SECRET")
            .ok_or_else(|| Error::Config("JWT_SECRET is not set".to_string()))?;
        let keys_directory = env
            .var("JWT_KEYS_DIRECTORY")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_KEYS_DIRECTORY.to_string());

        let mut cfg = Self::new(keys_directory, secret);
        if let Some(prefix) = env.var("JWT_ISSUER_ENV_PREFIX") {
            cfg.issuer_env_prefix = prefix;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations that could never sign or look up issuers.
    pub fn validate(&self) -> Result<()> {
        if self.secret.expose_secret().is_empty() {
            return Err(Error::Config("secret must not be empty".to_string()));
        }
        if self.issuer_env_prefix.is_empty() {
            return Err(Error::Config(
                "issuer_env_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn secret_bytes(&self) -> &[u8] {
        self.secret.expose_secret().as_bytes()
    }
}
