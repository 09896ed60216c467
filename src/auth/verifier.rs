// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token verification against the identity provider.
//!
//! The gate only sees the [`TokenVerifier`] trait, so the provider integration
//! can be swapped (or stubbed in tests) without touching the pipeline.
//!
//! ## Verification Modes
//!
//! - **Production**: [`JwtVerifier`] checks signature, expiry, issuer and
//!   audience against the provider's published JWKS
//! - **Development** (`dev` feature): [`InsecureJwtVerifier`] decodes without
//!   a signature check

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Validation};

use super::claims::{Claims, DecodedToken};
use super::error::VerificationError;
use super::jwks::JwksManager;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Verifies an opaque bearer token and returns its decoded claims.
///
/// Implementations must not cache results across calls.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<DecodedToken, VerificationError>;

    /// Short label for diagnostics.
    fn kind(&self) -> &'static str {
        "custom"
    }
}

/// JWKS-backed ID token verifier.
#[derive(Clone)]
pub struct JwtVerifier {
    jwks: Arc<JwksManager>,
    issuer: String,
    audience: Option<String>,
}

impl JwtVerifier {
    /// # Arguments
    /// - `jwks`: signing key source
    /// - `issuer`: expected `iss` claim
    pub fn new(jwks: Arc<JwksManager>, issuer: impl Into<String>) -> Self {
        Self {
            jwks,
            issuer: issuer.into(),
            audience: None,
        }
    }

    /// Set the expected audience.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<DecodedToken, VerificationError> {
        // Decode header to get kid
        let header =
            decode_header(token).map_err(|e| VerificationError::Malformed(e.to_string()))?;

        let (decoding_key, algorithm) = match &header.kid {
            Some(kid) => self.jwks.get_decoding_key(kid).await?,
            None => self.jwks.get_any_decoding_key().await?,
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        if let Some(audience) = &self.audience {
            validation.set_audience(&[audience]);
        } else {
            validation.validate_aud = false;
        }

        let token_data = decode::<Claims>(token, &decoding_key, &validation)?;
        DecodedToken::from_claims(token_data.claims)
    }

    fn kind(&self) -> &'static str {
        "jwks"
    }
}

/// Development verifier (no signature check).
///
/// WARNING: This should only be used in development environments.
#[cfg(feature = "dev")]
#[derive(Debug, Clone, Default)]
pub struct InsecureJwtVerifier;

#[cfg(feature = "dev")]
#[async_trait]
impl TokenVerifier for InsecureJwtVerifier {
    async fn verify(&self, token: &str) -> Result<DecodedToken, VerificationError> {
        let token_data = jsonwebtoken::dangerous::insecure_decode::<Claims>(token)
            .map_err(|e| VerificationError::Malformed(e.to_string()))?;

        let decoded = DecodedToken::from_claims(token_data.claims)?;

        let now = chrono::Utc::now().timestamp();
        if let Some(exp) = decoded.claims.get("exp").and_then(|v| v.as_i64()) {
            if exp < now - CLOCK_SKEW_LEEWAY as i64 {
                return Err(VerificationError::Expired);
            }
        }

        Ok(decoded)
    }

    fn kind(&self) -> &'static str {
        "insecure-dev"
    }
}
