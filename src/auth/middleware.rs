// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication gate for Axum.
//!
//! Runs once per request, before any authorization check:
//!
//! 1. Create a fresh [`SecurityContext`] and arm its clear-on-drop guard
//! 2. Read `Authorization: Bearer <token>`; anything else passes through
//!    anonymously
//! 3. Verify the token (bounded by a timeout) and map its claims to
//!    authorities
//! 4. On success install the principal; on failure log and stay anonymous
//! 5. Run the rest of the pipeline inside the context scope
//!
//! The gate never rejects a request. Deciding whether an anonymous caller
//! may proceed is the authorization gate's job.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

use super::claims::DecodedToken;
use super::context::SecurityContext;
use super::error::VerificationError;
use super::principal::Principal;
use super::verifier::TokenVerifier;

/// Literal prefix of a bearer credential.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Default upper bound on one verifier call.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Token verifier plus the timeout applied to every call.
#[derive(Clone)]
pub struct AuthGate {
    verifier: Arc<dyn TokenVerifier>,
    timeout: Duration,
}

impl AuthGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            verifier,
            timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn verifier_kind(&self) -> &'static str {
        self.verifier.kind()
    }

    /// Verify `token`, giving up after the configured timeout.
    pub async fn verify(&self, token: &str) -> Result<DecodedToken, VerificationError> {
        match tokio::time::timeout(self.timeout, self.verifier.verify(token)).await {
            Ok(result) => result,
            Err(_) => Err(VerificationError::Timeout(
                u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }

    /// Resolve the principal for a request, if its credentials verify.
    pub async fn authenticate_headers(&self, headers: &HeaderMap) -> Option<Principal> {
        let token = bearer_token(headers)?;

        match self.verify(token).await {
            Ok(decoded) => {
                let principal = Principal::from_verified(decoded, token);
                tracing::info!(
                    subject = %principal.subject(),
                    email = principal.email().unwrap_or("-"),
                    authorities = %principal.authorities(),
                    "Bearer token authenticated"
                );
                Some(principal)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Bearer token verification failed, continuing anonymously");
                None
            }
        }
    }
}

/// Extract the bearer token from the `Authorization` header.
///
/// Everything after the `Bearer ` prefix is the token, byte for byte.
/// Returns `None` when the header is absent, not valid UTF-8, lacks the
/// prefix, or nothing follows it.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?;
    (!token.is_empty()).then_some(token)
}

/// Authentication middleware function.
///
/// # Usage
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/v1/me", get(me))
///     .layer(axum::middleware::from_fn_with_state(gate, authenticate));
/// ```
pub async fn authenticate(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let context = SecurityContext::new();
    let _guard = context.clear_on_drop();

    match gate.authenticate_headers(request.headers()).await {
        Some(principal) => context.install(principal),
        None => tracing::debug!(path = %request.uri().path(), "Anonymous request"),
    }

    request.extensions_mut().insert(context.clone());
    context.scope(next.run(request)).await
}
