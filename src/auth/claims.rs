// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Decoded token and claim representation.
//!
//! The identity provider asserts claims as a loosely typed JSON object. Each
//! value is classified once, at decode time, into a [`ClaimValue`] so role
//! extraction never needs runtime casts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::error::VerificationError;

/// Maximum subject length accepted from the identity provider.
pub const MAX_SUBJECT_LEN: usize = 128;

/// A single claim value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClaimValue {
    /// A JSON string.
    Text(String),
    /// A JSON array whose elements are all strings.
    TextList(Vec<String>),
    /// Anything else (numbers, booleans, objects, mixed arrays, null).
    Other(Value),
}

impl ClaimValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClaimValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ClaimValue::TextList(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ClaimValue::Other(Value::Number(n)) => n.as_i64(),
            _ => None,
        }
    }

    /// Convert back to plain JSON (for responses).
    pub fn to_json(&self) -> Value {
        match self {
            ClaimValue::Text(s) => Value::String(s.clone()),
            ClaimValue::TextList(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            ClaimValue::Other(v) => v.clone(),
        }
    }
}

impl From<Value> for ClaimValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => ClaimValue::Text(s),
            Value::Array(items) if items.iter().all(Value::is_string) => ClaimValue::TextList(
                items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            other => ClaimValue::Other(other),
        }
    }
}

/// Claim map keyed by claim name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Claims(HashMap<String, ClaimValue>);

impl Claims {
    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// String claim, if present and a string.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ClaimValue::as_str)
    }
}

impl FromIterator<(String, Value)> for Claims {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name, ClaimValue::from(value)))
                .collect(),
        )
    }
}

impl From<serde_json::Map<String, Value>> for Claims {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl<'de> Deserialize<'de> for Claims {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = serde_json::Map::<String, Value>::deserialize(deserializer)?;
        Ok(map.into())
    }
}

/// A verified token, owned by exactly one request.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    /// Identity-provider subject (`sub`). Never empty.
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Every payload member, registered claims included.
    pub claims: Claims,
}

impl DecodedToken {
    /// Build from a verified payload.
    ///
    /// # Errors
    /// `VerificationError::Malformed` when `sub` is missing, not a string,
    /// empty, or longer than [`MAX_SUBJECT_LEN`].
    pub fn from_claims(claims: Claims) -> Result<Self, VerificationError> {
        let subject = match claims.text("sub") {
            Some(sub) if !sub.is_empty() && sub.chars().count() <= MAX_SUBJECT_LEN => {
                sub.to_string()
            }
            Some(_) => {
                return Err(VerificationError::Malformed(
                    "subject must be 1-128 characters".to_string(),
                ))
            }
            None => {
                return Err(VerificationError::Malformed(
                    "missing subject claim".to_string(),
                ))
            }
        };

        Ok(Self {
            email: claims.text("email").map(str::to_string),
            display_name: claims.text("name").map(str::to_string),
            subject,
            claims,
        })
    }

    /// Expiry (`exp`) as a timestamp, when present.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims
            .get("exp")
            .and_then(ClaimValue::as_i64)
            .and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}
