// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tenant extraction and the per-call request context.
//!
//! Authentication middleware that actually populates the tenant identity is
//! out of scope (see the crate-level Non-goals); this module only types the
//! context-scoped lookup the write/read coordinators depend on.

use std::sync::Arc;

use crate::error::DistributorError;

/// Logical owner of data; every coordinator operation is scoped to one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A context-scoped lookup returning the caller's tenant identity.
pub trait TenantProvider: Send + Sync {
    fn tenant(&self) -> Result<TenantId, DistributorError>;
}

/// A provider that always yields a fixed tenant, used by tests and the
/// demonstration CLI in place of real auth middleware.
pub struct FixedTenant(pub TenantId);

impl TenantProvider for FixedTenant {
    fn tenant(&self) -> Result<TenantId, DistributorError> {
        Ok(self.0.clone())
    }
}

/// A provider that always fails, exercising the `Unauthenticated` path.
pub struct NoTenant;

impl TenantProvider for NoTenant {
    fn tenant(&self) -> Result<TenantId, DistributorError> {
        Err(DistributorError::Unauthenticated)
    }
}

/// Per-call context threaded through the write/read coordinators.
///
/// Cancellation is modeled the same way the reference router models its
/// shutdown signal (a shared flag backed by a `watch` channel) rather than
/// inventing a parallel mechanism: `cancelled` flips once, and
/// [`RequestContext::cancelled`] gives callers a future to race against in
/// a `select!` alongside the quorum-completion signals.
#[derive(Clone)]
pub struct RequestContext {
    tenant_provider: Arc<dyn TenantProvider>,
    cancelled: tokio::sync::watch::Receiver<bool>,
}

impl RequestContext {
    pub fn new(tenant_provider: Arc<dyn TenantProvider>) -> (Self, ContextCanceller) {
        let (tx, rx) = tokio::sync::watch::channel(false);
        (
            Self {
                tenant_provider,
                cancelled: rx,
            },
            ContextCanceller(tx),
        )
    }

    /// Convenience constructor for a context that can never be cancelled.
    pub fn fixed(tenant_provider: Arc<dyn TenantProvider>) -> Self {
        Self::new(tenant_provider).0
    }

    pub fn tenant(&self) -> Result<TenantId, DistributorError> {
        self.tenant_provider.tenant()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once this context is cancelled; never resolves otherwise
    /// (including if the [`ContextCanceller`] is dropped without firing).
    /// Used as a `select!` arm so a worker waiting on a quorum that can no
    /// longer be reached is unblocked by the caller's deadline instead of
    /// hanging forever.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Handle used by the caller to cancel a [`RequestContext`].
pub struct ContextCanceller(tokio::sync::watch::Sender<bool>);

impl ContextCanceller {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}
