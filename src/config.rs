// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the typed [`ServerConfig`]
//! loaded from them at startup. A `.env` file is honoured by the binary.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `IDP_PROJECT_ID` | Identity-provider project; derives issuer and audience | none |
//! | `IDP_ISSUER` | Expected JWT issuer claim | derived from project |
//! | `IDP_AUDIENCE` | Expected JWT audience claim | derived from project |
//! | `IDP_JWKS_URL` | JWKS endpoint for signature verification | Google secure-token JWKS |
//! | `JWKS_CACHE_TTL_SECS` | Key-set cache lifetime | `300` |
//! | `VERIFY_TIMEOUT_MS` | Upper bound on one token verification | `5000` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; HTTPS when both are set | plain HTTP |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const IDP_PROJECT_ID_ENV: &str = "IDP_PROJECT_ID";
pub const IDP_ISSUER_ENV: &str = "IDP_ISSUER";
pub const IDP_AUDIENCE_ENV: &str = "IDP_AUDIENCE";
pub const IDP_JWKS_URL_ENV: &str = "IDP_JWKS_URL";
pub const JWKS_CACHE_TTL_ENV: &str = "JWKS_CACHE_TTL_SECS";
pub const VERIFY_TIMEOUT_ENV: &str = "VERIFY_TIMEOUT_MS";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";

/// Environment variable selecting the log output format.
///
/// `json` for structured production logs, anything else for human-readable.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Public signing keys for Firebase / Google Identity Platform ID tokens.
pub const DEFAULT_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Issuer prefix for ID tokens; the project id is appended.
pub const SECURETOKEN_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

pub const DEFAULT_JWKS_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not a valid {expected}: {value:?}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("IDP_JWKS_URL must be an https URL: {0}")]
    InsecureJwksUrl(String),

    #[error("token issuer not configured; set IDP_PROJECT_ID or IDP_ISSUER")]
    MissingIssuer,

    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    IncompleteTls,
}

/// PEM certificate chain and private key for HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// `None` only in `dev` builds, which then skip signature checks.
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub jwks_url: Url,
    pub jwks_cache_ttl: Duration,
    pub verify_timeout: Duration,
    pub tls: Option<TlsPaths>,
}

impl ServerConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` for variable values. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match get(PORT_ENV) {
            Some(v) => parse_number::<u16>(PORT_ENV, &v, "port")?,
            None => DEFAULT_PORT,
        };
        let bind_addr: SocketAddr =
            format!("{host}:{port}")
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    name: HOST_ENV,
                    expected: "bind address",
                    value: host.clone(),
                })?;

        let project_id = get(IDP_PROJECT_ID_ENV);
        let issuer = get(IDP_ISSUER_ENV).or_else(|| {
            project_id
                .as_ref()
                .map(|id| format!("{SECURETOKEN_ISSUER_PREFIX}{id}"))
        });
        let audience = get(IDP_AUDIENCE_ENV).or_else(|| project_id.clone());

        if issuer.is_none() && !cfg!(feature = "dev") {
            return Err(ConfigError::MissingIssuer);
        }

        let raw_url = get(IDP_JWKS_URL_ENV).unwrap_or_else(|| DEFAULT_JWKS_URL.to_string());
        let jwks_url = Url::parse(&raw_url).map_err(|_| ConfigError::InvalidValue {
            name: IDP_JWKS_URL_ENV,
            expected: "URL",
            value: raw_url.clone(),
        })?;
        if jwks_url.scheme() != "https" {
            return Err(ConfigError::InsecureJwksUrl(raw_url));
        }

        let jwks_cache_ttl = match get(JWKS_CACHE_TTL_ENV) {
            Some(v) => Duration::from_secs(parse_number(JWKS_CACHE_TTL_ENV, &v, "number of seconds")?),
            None => Duration::from_secs(DEFAULT_JWKS_CACHE_TTL_SECS),
        };
        let verify_timeout = match get(VERIFY_TIMEOUT_ENV) {
            Some(v) => Duration::from_millis(parse_number(VERIFY_TIMEOUT_ENV, &v, "number of milliseconds")?),
            None => Duration::from_millis(DEFAULT_VERIFY_TIMEOUT_MS),
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        Ok(Self {
            bind_addr,
            issuer,
            audience,
            jwks_url,
            jwks_cache_ttl,
            verify_timeout,
            tls,
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    name: &'static str,
    value: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        name,
        expected,
        value: value.to_string(),
    })
}
