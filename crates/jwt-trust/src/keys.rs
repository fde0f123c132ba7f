//! Key discovery and issuer trust.
//!
//! Keys are never cached: every call re-scans the keys directory and re-reads
//! the environment, so rotated files take effect on the next call.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use tracing::{debug, warn};

use crate::config::JwtConfig;
use crate::env::{Environment, ProcessEnv};
use crate::{Error, Result};

/// File name pattern of the private signing key.
pub const PRIVATE_KEY_PATTERN: &str = "jwt.*.key";

/// File name pattern of public verification keys.
pub const PUBLIC_KEY_PATTERN: &str = "jwt.*.key.pub";

// Issuer keys are accepted with or without trailing `=` padding.
const ISSUER_KEY_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// What kind of key a material holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Symmetric HMAC secret.
    SharedSecret,
    /// RSA key (private for signing, public for verification).
    Rsa,
}

impl KeyKind {
    /// The signing algorithm for this kind of key.
    pub fn algorithm(self) -> Algorithm {
        match self {
            KeyKind::SharedSecret => Algorithm::HS256,
            KeyKind::Rsa => Algorithm::RS256,
        }
    }
}

/// The key used to sign new tokens.
pub enum SigningMaterial {
    /// The configured shared secret.
    SharedSecret(EncodingKey),
    /// The single private key file in the keys directory.
    PrivateKey {
        /// File the key was loaded from.
        path: PathBuf,
        /// Parsed key.
        key: EncodingKey,
    },
}

impl SigningMaterial {
    /// Kind of key.
    pub fn kind(&self) -> KeyKind {
        match self {
            SigningMaterial::SharedSecret(_) => KeyKind::SharedSecret,
            SigningMaterial::PrivateKey { .. } => KeyKind::Rsa,
        }
    }

    /// Algorithm to sign with.
    pub fn algorithm(&self) -> Algorithm {
        self.kind().algorithm()
    }

    /// The key itself.
    pub fn encoding_key(&self) -> &EncodingKey {
        match self {
            SigningMaterial::SharedSecret(key) | SigningMaterial::PrivateKey { key, .. } => key,
        }
    }

    /// Source file, if the key came from one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            SigningMaterial::SharedSecret(_) => None,
            SigningMaterial::PrivateKey { path, .. } => Some(path),
        }
    }
}

impl fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("kind", &self.kind())
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

/// One candidate key of the fallback verification pool.
pub enum VerificationMaterial {
    /// A public key file from the keys directory.
    PublicKey {
        /// File the key was loaded from.
        path: PathBuf,
        /// Parsed key.
        key: DecodingKey,
    },
    /// The configured shared secret.
    SharedSecret(DecodingKey),
}

impl VerificationMaterial {
    /// Kind of key.
    pub fn kind(&self) -> KeyKind {
        match self {
            VerificationMaterial::PublicKey { .. } => KeyKind::Rsa,
            VerificationMaterial::SharedSecret(_) => KeyKind::SharedSecret,
        }
    }

    /// Algorithm a token must be signed with to verify against this key.
    pub fn algorithm(&self) -> Algorithm {
        self.kind().algorithm()
    }

    /// The key itself.
    pub fn decoding_key(&self) -> &DecodingKey {
        match self {
            VerificationMaterial::PublicKey { key, .. } | VerificationMaterial::SharedSecret(key) => {
                key
            }
        }
    }

    /// Source file, if the key came from one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            VerificationMaterial::PublicKey { path, .. } => Some(path),
            VerificationMaterial::SharedSecret(_) => None,
        }
    }
}

impl fmt::Debug for VerificationMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationMaterial")
            .field("kind", &self.kind())
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

/// Resolves signing and verification keys.
pub trait KeyStore: Send + Sync {
    /// The key new tokens are signed with.
    ///
    /// Falls back to the shared secret when no private key file exists and
    /// fails with [`Error::AmbiguousKey`] when more than one does.
    fn resolve_private_key(&self) -> Result<SigningMaterial>;

    /// Every public key file, followed by the shared secret.
    fn resolve_verification_materials(&self) -> Vec<VerificationMaterial>;

    /// The RSA public key trusted for `issuer`, if one is configured.
    fn resolve_issuer_key(&self, issuer: &str) -> Option<DecodingKey>;
}

impl<K: KeyStore + ?Sized> KeyStore for Arc<K> {
    fn resolve_private_key(&self) -> Result<SigningMaterial> {
        (**self).resolve_private_key()
    }

    fn resolve_verification_materials(&self) -> Vec<VerificationMaterial> {
        (**self).resolve_verification_materials()
    }

    fn resolve_issuer_key(&self, issuer: &str) -> Option<DecodingKey> {
        (**self).resolve_issuer_key(issuer)
    }
}

/// Key store backed by a keys directory and an environment.
pub struct FsKeyStore<E = ProcessEnv> {
    config: JwtConfig,
    env: E,
}

impl FsKeyStore<ProcessEnv> {
    /// Key store reading issuer trust from the process environment.
    pub fn new(config: JwtConfig) -> Self {
        Self::with_environment(config, ProcessEnv)
    }
}

impl<E: Environment> FsKeyStore<E> {
    /// Key store reading issuer trust from `env`.
    pub fn with_environment(config: JwtConfig, env: E) -> Self {
        Self { config, env }
    }

    /// The configuration in use.
    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Name of the variable holding the trusted key for `issuer`.
    ///
    /// `None` when the issuer normalizes to nothing.
    pub fn issuer_variable(&self, issuer: &str) -> Option<String> {
        let normalized = normalize_issuer(issuer);
        if normalized.is_empty() {
            return None;
        }
        Some(format!("{}{normalized}", self.config.issuer_env_prefix))
    }

    fn shared_secret(&self) -> &[u8] {
        self.config.secret_bytes()
    }
}

impl<E: Environment> fmt::Debug for FsKeyStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsKeyStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E: Environment> KeyStore for FsKeyStore<E> {
    fn resolve_private_key(&self) -> Result<SigningMaterial> {
        let directory = &self.config.keys_directory;
        let mut files = glob_keys(directory, PRIVATE_KEY_PATTERN)?;

        if files.len() > 1 {
            warn!(
                directory = %directory.display(),
                count = files.len(),
                "refusing to sign: multiple private keys found"
            );
            return Err(Error::AmbiguousKey {
                directory: directory.clone(),
                found: files,
            });
        }

        let Some(path) = files.pop() else {
            debug!(directory = %directory.display(), "no private key file, signing with shared secret");
            return Ok(SigningMaterial::SharedSecret(EncodingKey::from_secret(
                self.shared_secret(),
            )));
        };

        let pem = read_key_file(&path)?;
        let key = EncodingKey::from_rsa_pem(&pem).map_err(|e| Error::Key {
            path: path.clone(),
            message: format!("invalid RSA private key: {e}"),
        })?;
        Ok(SigningMaterial::PrivateKey { path, key })
    }

    fn resolve_verification_materials(&self) -> Vec<VerificationMaterial> {
        let directory = &self.config.keys_directory;
        let files = glob_keys(directory, PUBLIC_KEY_PATTERN).unwrap_or_else(|e| {
            warn!(error = %e, "could not scan for public keys");
            Vec::new()
        });

        let mut materials: Vec<VerificationMaterial> = files
            .into_iter()
            .filter_map(|path| match load_public_key(&path) {
                Ok(key) => Some(VerificationMaterial::PublicKey { path, key }),
                Err(e) => {
                    warn!(error = %e, "skipping unusable public key");
                    None
                }
            })
            .collect();

        materials.push(VerificationMaterial::SharedSecret(DecodingKey::from_secret(
            self.shared_secret(),
        )));
        materials
    }

    fn resolve_issuer_key(&self, issuer: &str) -> Option<DecodingKey> {
        let variable = self.issuer_variable(issuer)?;
        let encoded = self.env.var(&variable)?;

        // Line breaks are common when the value is pasted from `base64` output.
        let compact: String = encoded.split_ascii_whitespace().collect();
        let pem = match ISSUER_KEY_BASE64.decode(compact) {
            Ok(pem) => pem,
            Err(e) => {
                debug!(variable = %variable, error = %e, "issuer key is not valid base64");
                return None;
            }
        };

        match DecodingKey::from_rsa_pem(&pem) {
            Ok(key) => Some(key),
            Err(e) => {
                debug!(variable = %variable, error = %e, "issuer key is not an RSA public key");
                None
            }
        }
    }
}

/// Canonical, environment-variable-safe form of an issuer.
///
/// Trims, uppercases ASCII letters, and collapses every run of characters
/// outside `[A-Z0-9]` into a single `_`.
pub fn normalize_issuer(issuer: &str) -> String {
    let mut out = String::with_capacity(issuer.len());
    let mut in_gap = false;
    for c in issuer.trim().chars().map(|c| c.to_ascii_uppercase()) {
        if c.is_ascii_uppercase() || c.is_ascii_digit() {
            out.push(c);
            in_gap = false;
        } else if !in_gap {
            out.push('_');
            in_gap = true;
        }
    }
    out
}

// Matches are sorted by path; the directory part is matched literally.
fn glob_keys(directory: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let base = glob::Pattern::escape(&directory.to_string_lossy());
    let full = format!("{}/{pattern}", base.trim_end_matches('/'));

    let entries = glob::glob(&full).map_err(|e| Error::Key {
        path: directory.to_path_buf(),
        message: format!("invalid key pattern: {e}"),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::Key {
            path: e.path().to_path_buf(),
            message: e.error().to_string(),
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn read_key_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Key {
        path: path.to_path_buf(),
        message: format!("failed to read: {e}"),
    })
}

fn load_public_key(path: &Path) -> Result<DecodingKey> {
    let pem = read_key_file(path)?;
    DecodingKey::from_rsa_pem(&pem).map_err(|e| Error::Key {
        path: path.to_path_buf(),
        message: format!("invalid RSA public key: {e}"),
    })
}
