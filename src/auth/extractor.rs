// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors over the request security context.
//!
//! These read the [`SecurityContext`] the authentication gate put into the
//! request extensions; they never verify tokens themselves.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(principal): Auth) -> impl IntoResponse {
//!     // principal is Arc<Principal>
//! }
//! ```

use std::convert::Infallible;
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::context::SecurityContext;
use super::policy::Policy;
use super::principal::Principal;
use super::AuthError;

fn principal_from_parts(parts: &Parts) -> Option<Arc<Principal>> {
    parts
        .extensions
        .get::<SecurityContext>()
        .and_then(SecurityContext::current)
}

/// Extractor requiring an authenticated principal (401 otherwise).
///
/// A missing context (gate not layered) is treated as anonymous.
pub struct Auth(pub Arc<Principal>);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_parts(parts)
            .map(Auth)
            .ok_or(AuthError::Unauthorized)
    }
}

/// Extractor that requires the `ROLE_ADMIN` authority.
pub struct AdminOnly(pub Arc<Principal>);

impl<S> FromRequestParts<S> for AdminOnly
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = principal_from_parts(parts);
        Policy::has_role("admin").evaluate(principal.as_deref())?;
        principal.map(AdminOnly).ok_or(AuthError::Unauthorized)
    }
}

/// Optional authentication extractor.
///
/// Returns `None` for anonymous requests instead of rejecting.
pub struct OptionalAuth(pub Option<Arc<Principal>>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(principal_from_parts(parts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::principal;
    use axum::http::Request;

    fn parts_with(principal: Option<Principal>) -> Parts {
        let mut parts = Request::builder()
            .uri("/test")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let ctx = SecurityContext::new();
        if let Some(p) = principal {
            ctx.install(p);
        }
        parts.extensions.insert(ctx);
        parts
    }

    #[tokio::test]
    async fn auth_requires_principal() {
        let mut parts = parts_with(None);
        let result = Auth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));
    }

    #[tokio::test]
    async fn auth_without_gate_is_unauthorized() {
        let mut parts = Request::builder()
            .uri("/test")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let result = Auth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));
    }

    #[tokio::test]
    async fn auth_returns_installed_principal() {
        let mut parts = parts_with(Some(principal("uid-1", &["teacher"])));
        let Auth(p) = Auth::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(p.subject(), "uid-1");
    }

    #[tokio::test]
    async fn admin_only_rejects_non_admin() {
        let mut parts = parts_with(Some(principal("uid-1", &["teacher"])));
        let result = AdminOnly::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::Forbidden)));

        let mut parts = parts_with(None);
        let result = AdminOnly::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));

        let mut parts = parts_with(Some(principal("uid-0", &["admin"])));
        assert!(AdminOnly::from_request_parts(&mut parts, &()).await.is_ok());
    }

    #[tokio::test]
    async fn optional_auth_returns_none_without_user() {
        let mut parts = parts_with(None);
        let OptionalAuth(p) = OptionalAuth::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(p.is_none());
    }
}
