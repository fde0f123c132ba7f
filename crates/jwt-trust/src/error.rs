//! Error types.

use std::path::PathBuf;

use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// More than one private key file was found, so the signing key is ambiguous.
    #[error("multiple private keys found in {}: {}", directory.display(), display_paths(found))]
    AmbiguousKey {
        /// Directory that was scanned.
        directory: PathBuf,
        /// Every matching private key file.
        found: Vec<PathBuf>,
    },

    /// A token could not be built or signed.
    #[error("could not create token: {0}")]
    TokenCreation(String),

    /// A token was rejected.
    #[error(transparent)]
    TokenInvalid(#[from] InvalidToken),

    /// A key file could not be read or parsed.
    #[error("key error ({}): {message}", path.display())]
    Key {
        /// Offending file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Why a token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidToken {
    /// The token is not a structurally valid JWT.
    #[error("could not decode token: {0}")]
    Malformed(String),

    /// No trusted key verified the signature.
    #[error("token signature could not be verified")]
    SignatureUnverified,
}

impl Error {
    /// True for every failure that prevents a token from being issued.
    ///
    /// An ambiguous key directory is its own variant but still counts as a
    /// creation failure here.
    pub fn is_creation_error(&self) -> bool {
        matches!(self, Error::TokenCreation(_) | Error::AmbiguousKey { .. })
    }

    /// True when a presented token was rejected.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, Error::TokenInvalid(_))
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
