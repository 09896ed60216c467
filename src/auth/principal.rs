// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated principal.

use std::fmt;

use chrono::{DateTime, Utc};

use super::authorities::{map_claims_to_authorities, AuthoritySet};
use super::claims::{ClaimValue, DecodedToken};

/// The authenticated identity bound to one request.
///
/// `subject` is the identity provider's subject, not an internal database id.
/// Joining it to persisted user records is left to callers.
#[derive(Clone)]
pub struct Principal {
    subject: String,
    authorities: AuthoritySet,
    raw_token: String,
    token: DecodedToken,
}

impl Principal {
    /// Build a principal from a verified token, deriving its authorities.
    pub fn from_verified(token: DecodedToken, raw_token: impl Into<String>) -> Self {
        let authorities = map_claims_to_authorities(&token.claims);
        Self::new(token, authorities, raw_token)
    }

    /// Build a principal with explicit authorities.
    pub fn new(token: DecodedToken, authorities: AuthoritySet, raw_token: impl Into<String>) -> Self {
        Self {
            subject: token.subject.clone(),
            authorities,
            raw_token: raw_token.into(),
            token,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn authorities(&self) -> &AuthoritySet {
        &self.authorities
    }

    /// The bearer token exactly as presented.
    pub fn raw_token(&self) -> &str {
        &self.raw_token
    }

    pub fn token(&self) -> &DecodedToken {
        &self.token
    }

    pub fn email(&self) -> Option<&str> {
        self.token.email.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.token.display_name.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.token.expires_at()
    }

    pub fn claim(&self, name: &str) -> Option<&ClaimValue> {
        self.token.claims.get(name)
    }

    pub fn has_claim(&self, name: &str) -> bool {
        self.token.claims.contains(name)
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }

    /// Role check without the `ROLE_` prefix, e.g. `has_role("admin")`.
    pub fn has_role(&self, role: &str) -> bool {
        self.authorities.has_role(role)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("subject", &self.subject)
            .field("authorities", &self.authorities)
            .field("raw_token", &"[REDACTED]")
            .field("email", &self.token.email)
            .finish()
    }
}
