// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! School Auth - authentication and authorization core for the school
//! management API.
//!
//! Verifies identity-provider bearer tokens, maps their role claims to
//! `ROLE_*` authorities, and exposes the caller through a request-scoped
//! security context that route rules and handlers authorize against.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers and router (Axum)
//! - `auth` - Token verification, security context, authorization policies
//! - `config` - Environment configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;

#[cfg(test)]
mod test_support;
