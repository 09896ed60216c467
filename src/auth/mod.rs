// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer-token authentication and authorization for the school API.
//!
//! ## Auth Flow
//!
//! 1. The mobile/web client signs in with the identity provider
//! 2. The client sends `Authorization: Bearer <ID token>`
//! 3. The server:
//!    - verifies the token against the provider's JWKS
//!    - maps `role` / `roles` claims to `ROLE_*` authorities
//!    - installs a principal into a request-scoped security context
//! 4. Route rules and handler extractors decide 401 / 403 / permit
//!
//! ## Security
//!
//! - Verification failures are logged and the request continues anonymously
//! - Invalid and missing tokens are indistinguishable to the client
//! - The security context never outlives its request
//! - Clock skew tolerance is 60 seconds

pub mod authorities;
pub mod claims;
pub mod context;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod middleware;
pub mod policy;
pub mod principal;
pub mod verifier;

pub use authorities::{map_claims_to_authorities, Authority, AuthoritySet};
pub use claims::{ClaimValue, Claims, DecodedToken};
pub use context::SecurityContext;
pub use error::{AuthError, VerificationError};
pub use extractor::{AdminOnly, Auth, OptionalAuth};
pub use jwks::JwksManager;
pub use middleware::{authenticate, AuthGate};
pub use policy::{authorize, enforce_route_policy, Policy, RouteRules};
pub use principal::Principal;
#[cfg(feature = "dev")]
pub use verifier::InsecureJwtVerifier;
pub use verifier::{JwtVerifier, TokenVerifier};
