// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::time::Duration;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    auth::{authenticate, enforce_route_policy, Policy, RouteRules},
    error::ApiError,
    state::AppState,
};

pub mod health;
pub mod session;

const CORS_MAX_AGE: Duration = Duration::from_secs(3600);

/// Route-level rules. Handlers may tighten these further.
pub fn route_rules() -> RouteRules {
    RouteRules::new(Policy::Authenticated)
        .rule("/health", Policy::PermitAll)
        .rule("/health/**", Policy::PermitAll)
        .rule("/v1/admin/**", Policy::has_role("admin"))
}

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/me", get(session::me))
        .route("/me/claims/{name}", get(session::me_claim))
        .route("/users/{uid}/session", get(session::user_session))
        .route("/admin/auth-status", get(session::auth_status));

    // Layers run bottom-up: request id, trace, CORS, authentication, then
    // route policy closest to the handlers.
    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .fallback(not_found)
        .layer(from_fn_with_state(state.rules.clone(), enforce_route_policy))
        .layer(from_fn_with_state(state.gate.clone(), authenticate))
        .layer(cors_layer())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers([AUTHORIZATION])
        .max_age(CORS_MAX_AGE)
}

async fn not_found() -> ApiError {
    ApiError::not_found("not found")
}
