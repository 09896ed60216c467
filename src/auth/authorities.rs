// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorities derived from role claims.
//!
//! ## Mapping Rules
//!
//! - `role` (string) → one `ROLE_<ROLE>` authority
//! - `roles` (array of strings) → one `ROLE_<ROLE>` authority per element
//! - both fire when both are present; results are unioned
//! - nothing usable → exactly `ROLE_USER`
//!
//! Malformed shapes (a numeric `role`, a mixed `roles` array) are ignored
//! rather than rejected, so the worst outcome is the `ROLE_USER` fallback.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::claims::Claims;

/// Prefix shared by every role-derived authority.
pub const ROLE_PREFIX: &str = "ROLE_";

/// Fallback authority for principals whose claims carry no usable role.
pub const DEFAULT_AUTHORITY: &str = "ROLE_USER";

/// A normalized permission string, e.g. `ROLE_ADMIN`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Authority(String);

impl Authority {
    /// Wrap an already-normalized authority string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Build `ROLE_<ROLE>` from a role name. Returns `None` for blank names.
    pub fn from_role(role: &str) -> Option<Self> {
        let role = role.trim();
        if role.is_empty() {
            return None;
        }
        Some(Self(format!("{ROLE_PREFIX}{}", role.to_uppercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Set of authorities held by one principal. Duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AuthoritySet(BTreeSet<Authority>);

impl AuthoritySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, authority: Authority) -> bool {
        self.0.insert(authority)
    }

    pub fn contains(&self, authority: &str) -> bool {
        self.0.iter().any(|a| a.as_str() == authority)
    }

    /// Check for `ROLE_<ROLE>` given a bare role name (case-insensitive).
    pub fn has_role(&self, role: &str) -> bool {
        Authority::from_role(role).is_some_and(|a| self.0.contains(&a))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Authority> {
        self.0.iter()
    }
}

impl FromIterator<Authority> for AuthoritySet {
    fn from_iter<I: IntoIterator<Item = Authority>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for AuthoritySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Authority::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Map a claim set to authorities. Never fails and never returns an empty set.
pub fn map_claims_to_authorities(claims: &Claims) -> AuthoritySet {
    let mut authorities = AuthoritySet::new();

    if let Some(role) = claims.get("role").and_then(|v| v.as_str()) {
        authorities.0.extend(Authority::from_role(role));
    }

    if let Some(roles) = claims.get("roles").and_then(|v| v.as_list()) {
        authorities
            .0
            .extend(roles.iter().filter_map(|r| Authority::from_role(r)));
    }

    if authorities.is_empty() {
        authorities.insert(Authority::new(DEFAULT_AUTHORITY));
    }

    authorities
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn map(value: Value) -> Vec<String> {
        let claims: Claims = serde_json::from_value(value).unwrap();
        map_claims_to_authorities(&claims)
            .iter()
            .map(|a| a.to_string())
            .collect()
    }

    #[test]
    fn no_role_claims_falls_back_to_user() {
        assert_eq!(map(json!({})), vec!["ROLE_USER"]);
        assert_eq!(map(json!({ "sub": "u1", "email": "a@b.c" })), vec!["ROLE_USER"]);
    }

    #[test]
    fn single_role_is_prefixed_and_uppercased() {
        assert_eq!(map(json!({ "role": "admin" })), vec!["ROLE_ADMIN"]);
    }

    #[test]
    fn role_list_maps_each_element() {
        assert_eq!(
            map(json!({ "roles": ["teacher", "staff"] })),
            vec!["ROLE_STAFF", "ROLE_TEACHER"]
        );
    }

    #[test]
    fn role_and_roles_are_unioned() {
        assert_eq!(
            map(json!({ "role": "admin", "roles": ["teacher", "staff"] })),
            vec!["ROLE_ADMIN", "ROLE_STAFF", "ROLE_TEACHER"]
        );
    }

    #[test]
    fn duplicates_collapse() {
        assert_eq!(
            map(json!({ "role": "Teacher", "roles": ["teacher", "TEACHER"] })),
            vec!["ROLE_TEACHER"]
        );
    }

    #[test]
    fn malformed_shapes_degrade_to_user() {
        assert_eq!(map(json!({ "role": 7 })), vec!["ROLE_USER"]);
        assert_eq!(map(json!({ "roles": "teacher" })), vec!["ROLE_USER"]);
        assert_eq!(map(json!({ "roles": ["teacher", 1] })), vec!["ROLE_USER"]);
        assert_eq!(map(json!({ "role": null, "roles": {} })), vec!["ROLE_USER"]);
        assert_eq!(map(json!({ "role": "   ", "roles": [] })), vec!["ROLE_USER"]);
    }

    #[test]
    fn malformed_role_does_not_hide_valid_roles() {
        assert_eq!(
            map(json!({ "role": 7, "roles": ["student"] })),
            vec!["ROLE_STUDENT"]
        );
    }

    #[test]
    fn has_role_is_case_insensitive() {
        let set: AuthoritySet = [Authority::new("ROLE_ADMIN")].into_iter().collect();
        assert!(set.has_role("admin"));
        assert!(set.has_role("ADMIN"));
        assert!(!set.has_role("teacher"));
        assert!(!set.has_role(""));
        assert!(set.contains("ROLE_ADMIN"));
    }
}
