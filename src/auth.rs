//! Bearer token verification.
//!
//! Tokens are JWTs minted by an external identity provider. The `sub` claim
//! is the stable user id stored as survey owner and respondent.

use crate::app_config::AuthConfig;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Not authenticated")]
    MissingToken,

    #[error("Token has expired")]
    Expired,

    #[error("Could not validate credentials: {0}")]
    Invalid(String),

    #[error("Could not validate credentials - no user ID")]
    MissingSubject,

    #[error("Authentication is not configured: {0}")]
    Misconfigured(String),
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
}

/// Verifies bearer tokens. Built once at startup and shared by all workers.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        if !config.public_key_pem.trim().is_empty() {
            let algorithm = Algorithm::from_str(config.algorithm.trim())
                .map_err(|e| AuthError::Misconfigured(e.to_string()))?;
            let pem = config.public_key_pem.as_bytes();
            let key = match algorithm {
                Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
                    DecodingKey::from_rsa_pem(pem)
                }
                Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
                other => {
                    return Err(AuthError::Misconfigured(format!(
                        "{:?} cannot be used with a public key",
                        other
                    )))
                }
            }
            .map_err(|e| AuthError::Misconfigured(e.to_string()))?;

            Ok(Self::keyed(key, algorithm, config))
        } else if !config.shared_secret.is_empty() {
            let key = DecodingKey::from_secret(config.shared_secret.as_bytes());
            Ok(Self::keyed(key, Algorithm::HS256, config))
        } else if config.allow_unverified {
            log::warn!("Bearer tokens are decoded WITHOUT signature verification");
            let mut validation = Validation::default();
            validation.insecure_disable_signature_validation();
            validation.validate_exp = false;
            validation.validate_aud = false;
            validation.required_spec_claims.clear();
            Ok(Self {
                key: DecodingKey::from_secret(&[]),
                validation,
            })
        } else {
            Err(AuthError::Misconfigured(
                "set auth.public_key_pem, auth.shared_secret or auth.allow_unverified".to_owned(),
            ))
        }
    }

    fn keyed(key: DecodingKey, algorithm: Algorithm, config: &AuthConfig) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway_seconds;
        validation.validate_aud = false;
        if !config.issuer.is_empty() {
            validation.set_issuer(&[config.issuer.as_str()]);
        }
        Self { key, validation }
    }

    /// Resolve a raw token to the user id it was issued for.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            }
        })?;

        match data.claims.sub {
            Some(sub) if !sub.is_empty() => Ok(sub),
            _ => Err(AuthError::MissingSubject),
        }
    }

    /// Verify the value of an `Authorization` header.
    pub fn verify_header(&self, header: &str) -> Result<String, AuthError> {
        let token = bearer_token(header).ok_or(AuthError::MissingToken)?;
        self.verify(token)
    }
}

/// Extract the token from `Bearer <token>`. The scheme is case-insensitive.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
