// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Declarative authorization policies.
//!
//! ## Decision Table
//!
//! | Principal | Policy permits anonymous | Predicate | Outcome |
//! |-----------|--------------------------|-----------|---------|
//! | none      | yes                      | -         | permit  |
//! | none      | no                       | -         | 401     |
//! | present   | -                        | true      | permit  |
//! | present   | -                        | false     | 403     |
//!
//! Policies are evaluated per route (see [`RouteRules`]) or inside handlers
//! via [`authorize`].

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::authorities::Authority;
use super::context;
use super::error::AuthError;
use super::principal::Principal;

/// A boolean expression over the current principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    /// Anyone, including anonymous callers.
    PermitAll,
    /// Any authenticated principal.
    Authenticated,
    /// Holds this exact authority string.
    HasAuthority(String),
    /// Holds `ROLE_<ROLE>`.
    HasRole(String),
    /// Current subject equals this identifier exactly.
    ///
    /// This compares the identity-provider subject with whatever the caller
    /// passes in. It does not resolve internal user ids, so callers passing a
    /// database id will never match.
    IsCurrentUser(String),
    AnyOf(Vec<Policy>),
    AllOf(Vec<Policy>),
}

impl Policy {
    pub fn has_role(role: impl Into<String>) -> Self {
        Policy::HasRole(role.into())
    }

    pub fn has_authority(authority: impl Into<String>) -> Self {
        Policy::HasAuthority(authority.into())
    }

    pub fn is_current_user(id: impl Into<String>) -> Self {
        Policy::IsCurrentUser(id.into())
    }

    pub fn any_of(policies: impl IntoIterator<Item = Policy>) -> Self {
        Policy::AnyOf(policies.into_iter().collect())
    }

    pub fn all_of(policies: impl IntoIterator<Item = Policy>) -> Self {
        Policy::AllOf(policies.into_iter().collect())
    }

    /// `ROLE_ADMIN` or the caller owns `id`.
    pub fn admin_or_current_user(id: impl Into<String>) -> Self {
        Policy::any_of([Policy::has_role("admin"), Policy::is_current_user(id)])
    }

    /// Whether a caller without a principal satisfies this policy.
    pub fn permits_anonymous(&self) -> bool {
        match self {
            Policy::PermitAll => true,
            Policy::AnyOf(policies) => policies.iter().any(Policy::permits_anonymous),
            Policy::AllOf(policies) => policies.iter().all(Policy::permits_anonymous),
            _ => false,
        }
    }

    /// Evaluate against an authenticated principal.
    pub fn is_satisfied_by(&self, principal: &Principal) -> bool {
        match self {
            Policy::PermitAll | Policy::Authenticated => true,
            Policy::HasAuthority(authority) => principal.has_authority(authority),
            Policy::HasRole(role) => Authority::from_role(role)
                .is_some_and(|a| principal.has_authority(a.as_str())),
            Policy::IsCurrentUser(id) => principal.subject() == id,
            Policy::AnyOf(policies) => policies.iter().any(|p| p.is_satisfied_by(principal)),
            Policy::AllOf(policies) => policies.iter().all(|p| p.is_satisfied_by(principal)),
        }
    }

    /// Decide for an optional principal.
    ///
    /// # Errors
    /// `Unauthorized` without a principal (unless anonymous is permitted),
    /// `Forbidden` when the principal does not satisfy the policy.
    pub fn evaluate(&self, principal: Option<&Principal>) -> Result<(), AuthError> {
        match principal {
            None if self.permits_anonymous() => Ok(()),
            None => Err(AuthError::Unauthorized),
            Some(p) if self.is_satisfied_by(p) => Ok(()),
            Some(_) => Err(AuthError::Forbidden),
        }
    }
}

/// Evaluate `policy` against the ambient request context.
///
/// Returns the principal when one is installed and the policy holds.
pub fn authorize(policy: &Policy) -> Result<Option<Arc<Principal>>, AuthError> {
    let principal = context::current();
    policy.evaluate(principal.as_deref())?;
    Ok(principal)
}

/// "Is this the current user": exact match on the ambient subject.
pub fn is_current_user(id: &str) -> bool {
    context::current_subject().is_some_and(|subject| subject == id)
}

/// A path pattern: exact (`/v1/me`) or prefix (`/v1/admin/**`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix("/**") {
            Some(base) => PathPattern::Prefix(base.to_string()),
            None => PathPattern::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(p) => path == p,
            PathPattern::Prefix(base) => {
                path == base
                    || path
                        .strip_prefix(base.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

/// Ordered route rules; the first matching pattern decides.
#[derive(Debug, Clone)]
pub struct RouteRules {
    rules: Vec<(PathPattern, Policy)>,
    default: Policy,
}

impl RouteRules {
    /// Rules with `default` for unmatched paths.
    pub fn new(default: Policy) -> Self {
        Self {
            rules: Vec::new(),
            default,
        }
    }

    pub fn rule(mut self, pattern: &str, policy: Policy) -> Self {
        self.rules.push((PathPattern::parse(pattern), policy));
        self
    }

    pub fn policy_for(&self, path: &str) -> &Policy {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, policy)| policy)
            .unwrap_or(&self.default)
    }
}

impl Default for RouteRules {
    /// Everything requires authentication.
    fn default() -> Self {
        Self::new(Policy::Authenticated)
    }
}

/// Route-level authorization middleware. Must run inside the authentication
/// gate so the ambient context is populated.
pub async fn enforce_route_policy(
    State(rules): State<Arc<RouteRules>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    match authorize(rules.policy_for(&path)) {
        Ok(_) => next.run(request).await,
        Err(e) => {
            tracing::debug!(path = %path, error = %e, "Route policy denied request");
            e.into_response()
        }
    }
}
