// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::api::route_rules;
use crate::auth::{AuthGate, JwksManager, RouteRules};

#[derive(Clone)]
pub struct AppState {
    pub gate: AuthGate,
    pub rules: Arc<RouteRules>,
    /// Key set behind the verifier, when it uses one. Reported by readiness.
    pub jwks: Option<Arc<JwksManager>>,
}

impl AppState {
    /// State with the service's standard route rules.
    pub fn new(gate: AuthGate) -> Self {
        Self {
            gate,
            rules: Arc::new(route_rules()),
            jwks: None,
        }
    }

    pub fn with_jwks(mut self, jwks: Arc<JwksManager>) -> Self {
        self.jwks = Some(jwks);
        self
    }
}
