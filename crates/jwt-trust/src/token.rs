//! Token signing and verification.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde::de::IgnoredAny;
use serde_json::{Map, Value};
use tracing::debug;

use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::InvalidToken;
use crate::keys::{FsKeyStore, KeyStore};
use crate::{Error, Result};

/// Encodes claims into signed tokens and verifies presented tokens.
///
/// Trust decisions are delegated to the [`KeyStore`]; the engine itself holds
/// no state between calls and is safe to share across threads.
#[derive(Debug)]
pub struct TokenEngine<K> {
    keys: K,
}

impl TokenEngine<FsKeyStore> {
    /// Engine over the keys directory in `config`, trusting issuers from the
    /// process environment.
    pub fn from_config(config: JwtConfig) -> Self {
        Self::new(FsKeyStore::new(config))
    }
}

impl<K: KeyStore> TokenEngine<K> {
    /// Engine over an arbitrary key store.
    pub fn new(keys: K) -> Self {
        Self { keys }
    }

    /// The key store in use.
    pub fn key_store(&self) -> &K {
        &self.keys
    }

    /// Sign `payload` and return the compact token.
    ///
    /// Null claims are dropped. The algorithm follows the resolved key: RS256
    /// for a private key file, HS256 for the shared secret.
    ///
    /// # Errors
    ///
    /// [`Error::AmbiguousKey`] when several private key files exist, otherwise
    /// [`Error::TokenCreation`] for any claim, key or signing failure.
    pub fn encode(&self, payload: &Claims) -> Result<String> {
        let body = payload.to_signing_body()?;
        let material = self.keys.resolve_private_key().map_err(into_creation_error)?;
        let header = Header::new(material.algorithm());

        jsonwebtoken::encode(&header, &body, material.encoding_key())
            .map_err(|e| Error::TokenCreation(e.to_string()))
    }

    /// Verify `token` and return its normalized claims.
    ///
    /// A token carrying `iss` is first checked against the RSA key trusted for
    /// that issuer. If there is no such key, or it does not verify, every
    /// public key file and finally the shared secret are tried in turn.
    ///
    /// # Errors
    ///
    /// [`InvalidToken::Malformed`] when the token cannot be parsed or carries a
    /// non-numeric date claim, and
    /// [`InvalidToken::SignatureUnverified`] when no key verifies it.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let parsed = parse(token)?;

        if let Some(issuer) = parsed.claims.issuer() {
            if self.verify_issuer(token, &issuer) {
                debug!(issuer = %issuer, "token verified by issuer trust");
                return Ok(parsed.claims);
            }
        }

        for candidate in self.keys.resolve_verification_materials() {
            match verify_signature(token, candidate.algorithm(), candidate.decoding_key()) {
                Ok(()) => {
                    debug!(kind = ?candidate.kind(), path = ?candidate.path(), "token verified");
                    return Ok(parsed.claims);
                }
                Err(e) => {
                    debug!(
                        kind = ?candidate.kind(),
                        path = ?candidate.path(),
                        token_alg = ?parsed.header.alg,
                        error = %e,
                        "candidate key rejected token"
                    );
                }
            }
        }

        Err(InvalidToken::SignatureUnverified.into())
    }

    fn verify_issuer(&self, token: &str, issuer: &str) -> bool {
        let Some(key) = self.keys.resolve_issuer_key(issuer) else {
            debug!(issuer = %issuer, "no trusted key for issuer, falling back");
            return false;
        };
        match verify_signature(token, Algorithm::RS256, &key) {
            Ok(()) => true,
            Err(e) => {
                debug!(issuer = %issuer, error = %e, "issuer key rejected token, falling back");
                false
            }
        }
    }
}

struct ParsedToken {
    header: Header,
    claims: Claims,
}

fn parse(token: &str) -> Result<ParsedToken> {
    let malformed = |reason: String| Error::from(InvalidToken::Malformed(reason));

    let segments: Vec<&str> = token.trim().split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(malformed(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    };

    let header = jsonwebtoken::decode_header(token.trim())
        .map_err(|e| malformed(format!("invalid header: {e}")))?;
    let payload = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| malformed(format!("invalid claims encoding: {e}")))?;
    let claims: Map<String, Value> = serde_json::from_slice(&payload)
        .map_err(|e| malformed(format!("claims are not a JSON object: {e}")))?;

    Ok(ParsedToken {
        header,
        claims: Claims::from(claims).normalized()?,
    })
}

// Signature only: time-based claims are left to the caller. The header `alg`
// must equal `algorithm`, so a key is never used with a foreign algorithm.
fn verify_signature(
    token: &str,
    algorithm: Algorithm,
    key: &DecodingKey,
) -> std::result::Result<(), jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<IgnoredAny>(token.trim(), key, &validation).map(|_| ())
}

fn into_creation_error(err: Error) -> Error {
    match err {
        Error::AmbiguousKey { .. } | Error::TokenCreation(_) => err,
        other => Error::TokenCreation(other.to_string()),
    }
}
