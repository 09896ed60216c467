// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{routing::get, Json, Router};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

use crate::auth::{
    AuthGate, Claims, DecodedToken, JwksManager, Principal, TokenVerifier, VerificationError,
};
use crate::state::AppState;

pub const TEST_ISSUER: &str = "https://securetoken.google.com/sekolah-test";
pub const TEST_AUDIENCE: &str = "sekolah-test";
pub const TEST_KID: &str = "test-key-1";
const TEST_SECRET: &[u8] = b"school-auth-test-secret-key-01234";

/// Far-future expiry (2100-01-01).
const FAR_FUTURE_EXP: i64 = 4_102_444_800;

/// A verified token for `subject` carrying `roles`.
pub fn decoded(subject: &str, roles: &[&str]) -> DecodedToken {
    let claims: Claims = serde_json::from_value(json!({
        "sub": subject,
        "email": format!("{subject}@sekolah.test"),
        "name": format!("User {subject}"),
        "roles": roles,
        "exp": FAR_FUTURE_EXP,
    }))
    .unwrap();
    DecodedToken::from_claims(claims).unwrap()
}

pub fn principal(subject: &str, roles: &[&str]) -> Principal {
    Principal::from_verified(decoded(subject, roles), format!("token-{subject}"))
}

/// Key set document holding the HS256 test key under [`TEST_KID`].
pub fn test_jwks_document() -> serde_json::Value {
    json!({
        "keys": [{
            "kty": "oct",
            "kid": TEST_KID,
            "alg": "HS256",
            "k": URL_SAFE_NO_PAD.encode(TEST_SECRET),
        }]
    })
}

/// Static manager over [`test_jwks_document`].
pub fn test_jwks() -> JwksManager {
    let jwks: JwkSet = serde_json::from_value(test_jwks_document()).unwrap();
    JwksManager::from_static(jwks)
}

/// Local JWKS endpoint serving [`test_jwks_document`].
///
/// Counts answered fetches; once set to hang, accepts requests and never
/// responds.
pub struct JwksServer {
    addr: SocketAddr,
    fetches: Arc<AtomicUsize>,
    hang: Arc<AtomicBool>,
}

impl JwksServer {
    pub fn url(&self) -> String {
        format!("http://{}/jwks.json", self.addr)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }
}

pub async fn spawn_jwks_server() -> JwksServer {
    let fetches = Arc::new(AtomicUsize::new(0));
    let hang = Arc::new(AtomicBool::new(false));

    let (counter, hanging) = (fetches.clone(), hang.clone());
    let app = Router::new().route(
        "/jwks.json",
        get(move || {
            let (counter, hanging) = (counter.clone(), hanging.clone());
            async move {
                if hanging.load(Ordering::SeqCst) {
                    std::future::pending::<()>().await;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                Json(test_jwks_document())
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    JwksServer {
        addr,
        fetches,
        hang,
    }
}

/// Claims accepted by a verifier built with [`TEST_ISSUER`] / [`TEST_AUDIENCE`].
pub fn valid_payload(subject: &str) -> serde_json::Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "sub": subject,
        "iss": TEST_ISSUER,
        "aud": TEST_AUDIENCE,
        "iat": now,
        "exp": now + 3600,
    })
}

/// Sign `claims` with the test key.
pub fn sign_token(claims: &serde_json::Value, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &EncodingKey::from_secret(TEST_SECRET)).unwrap()
}

/// In-memory verifier: known tokens verify, everything else is rejected.
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, DecodedToken>,
    delay: Option<Duration>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, decoded: DecodedToken) -> Self {
        self.tokens.insert(token.to_string(), decoded);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<DecodedToken, VerificationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| VerificationError::Rejected("unknown token".to_string()))
    }

    fn kind(&self) -> &'static str {
        "static"
    }
}

/// Verifier knowing `admin-token`, `teacher-token` and `student-token`.
pub fn school_verifier() -> StaticTokenVerifier {
    StaticTokenVerifier::new()
        .with_token("admin-token", decoded("uid-admin", &["admin"]))
        .with_token("teacher-token", decoded("uid-teacher", &["teacher", "staff"]))
        .with_token("student-token", decoded("uid-student", &["student"]))
}

pub fn test_state() -> AppState {
    AppState::new(AuthGate::new(Arc::new(school_verifier())))
}
