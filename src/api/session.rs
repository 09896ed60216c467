// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session endpoints: who the caller is, as the security context sees it.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::auth::{authorize, AdminOnly, Auth, AuthError, AuthoritySet, Policy, Principal};
use crate::error::ApiError;
use crate::state::AppState;

/// Principal view returned by the session endpoints.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// Identity-provider subject
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub authorities: AuthoritySet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Principal> for SessionResponse {
    fn from(principal: &Principal) -> Self {
        Self {
            subject: principal.subject().to_string(),
            email: principal.email().map(str::to_string),
            display_name: principal.display_name().map(str::to_string),
            authorities: principal.authorities().clone(),
            expires_at: principal.expires_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub name: String,
    pub value: Value,
}

/// Verifier and key-cache state, for operators.
#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    pub verifier: String,
    pub verify_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_cached: Option<bool>,
    /// Subject of the admin asking.
    pub requested_by: String,
}

/// GET /v1/me
pub async fn me(Auth(principal): Auth) -> Json<SessionResponse> {
    Json(principal.as_ref().into())
}

/// GET /v1/me/claims/{name}
///
/// 404 when the token does not carry the claim.
pub async fn me_claim(
    Auth(principal): Auth,
    Path(name): Path<String>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let value = principal
        .claim(&name)
        .map(|v| v.to_json())
        .ok_or_else(|| ApiError::not_found(format!("claim '{name}' not present")))?;
    Ok(Json(ClaimResponse { name, value }))
}

/// GET /v1/users/{uid}/session
///
/// Admins may read anyone's session; everyone else only their own.
pub async fn user_session(Path(uid): Path<String>) -> Response {
    match authorize(&Policy::admin_or_current_user(uid.as_str())) {
        Ok(Some(principal)) => Json(SessionResponse::from(principal.as_ref())).into_response(),
        Ok(None) => AuthError::Unauthorized.into_response(),
        Err(e) => {
            tracing::info!(target_uid = %uid, error = %e, "Session lookup denied");
            e.into_response()
        }
    }
}

/// GET /v1/admin/auth-status
pub async fn auth_status(
    State(state): State<AppState>,
    AdminOnly(admin): AdminOnly,
) -> Json<AuthStatusResponse> {
    let jwks_cached = match &state.jwks {
        Some(jwks) => Some(jwks.is_cached().await),
        None => None,
    };

    Json(AuthStatusResponse {
        verifier: state.gate.verifier_kind().to_string(),
        verify_timeout_ms: u64::try_from(state.gate.timeout().as_millis()).unwrap_or(u64::MAX),
        jwks_url: state
            .jwks
            .as_ref()
            .and_then(|j| j.jwks_url().map(str::to_string)),
        jwks_cached,
        requested_by: admin.subject().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::router;
    use crate::test_support::{principal, test_state};
    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, Request, StatusCode},
    };
    use axum::Router;
    use tower::ServiceExt;

    async fn get(uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        send(router(test_state()), uri, token).await
    }

    async fn send(app: Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    #[test]
    fn session_response_from_principal() {
        let p = principal("uid-9", &["teacher"]);
        let response = SessionResponse::from(&p);
        assert_eq!(response.subject, "uid-9");
        assert_eq!(response.email.as_deref(), Some("uid-9@sekolah.test"));
        assert_eq!(response.display_name.as_deref(), Some("User uid-9"));
        assert!(response.authorities.contains("ROLE_TEACHER"));
        assert!(response.expires_at.is_some());
    }

    #[tokio::test]
    async fn me_requires_a_valid_token() {
        let (status, body) = get("/v1/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "unauthorized");

        let (status, body) = get("/v1/me", Some("forged-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "unauthorized");
    }

    #[tokio::test]
    async fn me_returns_the_principal() {
        let (status, body) = get("/v1/me", Some("teacher-token")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subject"], "uid-teacher");
        assert_eq!(body["email"], "uid-teacher@sekolah.test");
        assert_eq!(
            body["authorities"],
            serde_json::json!(["ROLE_STAFF", "ROLE_TEACHER"])
        );
    }

    #[tokio::test]
    async fn claim_lookup() {
        let (status, body) = get("/v1/me/claims/roles", Some("student-token")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], serde_json::json!(["student"]));

        let (status, body) = get("/v1/me/claims/school_id", Some("student-token")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "claim 'school_id' not present");
    }

    #[tokio::test]
    async fn admin_endpoint_distinguishes_401_and_403() {
        let (status, _) = get("/v1/admin/auth-status", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = get("/v1/admin/auth-status", Some("student-token")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error_code"], "forbidden");

        let (status, body) = get("/v1/admin/auth-status", Some("admin-token")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verifier"], "static");
        assert_eq!(body["verify_timeout_ms"], 5000);
        assert_eq!(body["requested_by"], "uid-admin");
    }

    #[tokio::test]
    async fn user_session_for_owner_or_admin() {
        let (status, body) = get("/v1/users/uid-student/session", Some("student-token")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subject"], "uid-student");

        let (status, body) = get("/v1/users/uid-student/session", Some("admin-token")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subject"], "uid-admin");

        let (status, _) = get("/v1/users/uid-student/session", Some("teacher-token")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = get("/v1/users/uid-student/session", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_is_public() {
        let (status, body) = get("/health/live", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, _) = get("/health", Some("forged-token")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_paths_need_authentication_first() {
        let (status, _) = get("/v1/nowhere", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = get("/v1/nowhere", Some("student-token")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn authentication_does_not_leak_between_requests() {
        let app = router(test_state());

        let authed = Request::builder()
            .uri("/v1/me")
            .header(AUTHORIZATION, "Bearer admin-token")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(authed).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let anonymous = Request::builder().uri("/v1/me").body(Body::empty()).unwrap();
        let response = app.oneshot(anonymous).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_keep_their_own_principal() {
        let app = router(test_state());

        for _ in 0..16 {
            let (admin, forged, student) = tokio::join!(
                tokio::spawn(send(app.clone(), "/v1/me", Some("admin-token"))),
                tokio::spawn(send(app.clone(), "/v1/me", Some("forged-token"))),
                tokio::spawn(send(app.clone(), "/v1/me", Some("student-token"))),
            );

            let (status, body) = admin.unwrap();
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["subject"], "uid-admin");

            let (status, body) = forged.unwrap();
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["error_code"], "unauthorized");

            let (status, body) = student.unwrap();
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["subject"], "uid-student");
        }
    }
}
