//! jwt-trust
//!
//! Issues and verifies JWTs for deployments where several issuers sign with
//! different keys and a shared HMAC secret coexists with RSA key pairs.
//!
//! - **Signing** uses the single `jwt.*.key` file in the keys directory (RS256),
//!   or the shared secret (HS256) when there is none.
//! - **Verification** first tries the RSA key trusted for the token's `iss`
//!   (from `JWT_PUBLIC_KEY_<ISSUER>`), then every `jwt.*.key.pub` file, then the
//!   shared secret.
//!
//! The core API is [`TokenEngine`], which takes any [`KeyStore`];
//! [`FsKeyStore`] is the directory + environment implementation.
//!
//! ## Quick start
//! ```no_run
//! use jwt_trust::{Claims, JwtConfig, TokenEngine};
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = TokenEngine::from_config(JwtConfig::new("/etc/jwt", "secret"));
//!
//! let token = engine.encode(&Claims::new().with("sub", "fidmaster"))?;
//! let claims = engine.decode(&token)?;
//!
//! println!("sub={:?}", claims.sub());
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod claims;
mod config;
mod env;
mod error;
mod keys;
mod token;

pub use claims::{Claims, DATE_CLAIMS};
pub use config::{DEFAULT_ISSUER_ENV_PREFIX, DEFAULT_KEYS_DIRECTORY, JwtConfig};
pub use env::{Environment, ProcessEnv};
pub use error::{Error, InvalidToken, Result};
pub use keys::{
    FsKeyStore, KeyKind, KeyStore, PRIVATE_KEY_PATTERN, PUBLIC_KEY_PATTERN, SigningMaterial,
    VerificationMaterial, normalize_issuer,
};
pub use token::TokenEngine;
