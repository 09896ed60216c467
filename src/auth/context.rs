// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request-scoped security context.
//!
//! A [`SecurityContext`] is created fresh for every request by the
//! authentication gate. It is reachable two ways:
//!
//! - explicitly, from the request extensions (extractors use this)
//! - ambiently, through a tokio task-local scope wrapping the rest of the
//!   pipeline (the free functions in this module)
//!
//! Outside a request scope every ambient read is empty. The gate holds a
//! [`ClearOnDrop`] guard for the whole request, so the slot is emptied on
//! return, on panic and on cancellation alike.
//!
//! Tasks spawned from a handler do not inherit the scope; pass the context
//! explicitly if they need it.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::authorities::AuthoritySet;
use super::claims::ClaimValue;
use super::principal::Principal;

tokio::task_local! {
    static CURRENT: SecurityContext;
}

/// Holds at most one principal for the lifetime of one request.
#[derive(Clone, Default)]
pub struct SecurityContext {
    slot: Arc<RwLock<Option<Arc<Principal>>>>,
}

impl SecurityContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a principal, replacing any existing one.
    pub fn install(&self, principal: Principal) {
        *self.write() = Some(Arc::new(principal));
    }

    pub fn current(&self) -> Option<Arc<Principal>> {
        self.read().clone()
    }

    pub fn clear(&self) {
        *self.write() = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    pub fn current_subject(&self) -> Option<String> {
        self.read().as_ref().map(|p| p.subject().to_string())
    }

    /// Authorities of the current principal; empty when anonymous.
    pub fn current_authorities(&self) -> AuthoritySet {
        self.read()
            .as_ref()
            .map(|p| p.authorities().clone())
            .unwrap_or_default()
    }

    /// Guard that clears this context when dropped.
    #[must_use = "the context is cleared as soon as the guard is dropped"]
    pub fn clear_on_drop(&self) -> ClearOnDrop {
        ClearOnDrop(self.clone())
    }

    /// Run `fut` with this context as the ambient one.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    // A panic while holding the lock cannot leave the slot half-written, so
    // poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Option<Arc<Principal>>> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Arc<Principal>>> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("principal", &*self.read())
            .finish()
    }
}

/// Clears the wrapped context on drop.
pub struct ClearOnDrop(SecurityContext);

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        self.0.clear();
    }
}

/// The ambient context of the running request, if any.
pub fn ambient() -> Option<SecurityContext> {
    CURRENT.try_with(SecurityContext::clone).ok()
}

pub fn current() -> Option<Arc<Principal>> {
    CURRENT.try_with(SecurityContext::current).ok().flatten()
}

pub fn current_subject() -> Option<String> {
    current().map(|p| p.subject().to_string())
}

pub fn current_authorities() -> AuthoritySet {
    current()
        .map(|p| p.authorities().clone())
        .unwrap_or_default()
}

pub fn current_email() -> Option<String> {
    current().and_then(|p| p.email().map(str::to_string))
}

pub fn current_display_name() -> Option<String> {
    current().and_then(|p| p.display_name().map(str::to_string))
}

pub fn has_claim(name: &str) -> bool {
    current().is_some_and(|p| p.has_claim(name))
}

pub fn claim(name: &str) -> Option<ClaimValue> {
    current().and_then(|p| p.claim(name).cloned())
}

/// Role check without the `ROLE_` prefix. False when anonymous.
pub fn has_role(role: &str) -> bool {
    current().is_some_and(|p| p.has_role(role))
}
