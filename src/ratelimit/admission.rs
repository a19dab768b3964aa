//! The per-request admission pipeline: resolve the identity, then consult
//! the limiter engine.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::key::{KeyResolver, ResolvedKey};
use super::limiter::RateLimiter;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed
    Admitted,
    /// Rejected by an existing block marker; the counter was not consulted
    Blocked,
    /// Rejected by the limiter: the limit was reached or the store failed
    Rejected,
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted)
    }
}

/// Resolver and limiter composed with the block duration they share.
#[derive(Clone)]
pub struct AdmissionControl {
    resolver: Arc<KeyResolver>,
    limiter: Arc<RateLimiter>,
    block_duration: Duration,
}

impl AdmissionControl {
    pub fn new(resolver: KeyResolver, limiter: Arc<RateLimiter>, block_duration: Duration) -> Self {
        Self {
            resolver: Arc::new(resolver),
            limiter,
            block_duration,
        }
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    /// Check one request against its resolved identity.
    ///
    /// An existing block short-circuits before the counter is read; only an
    /// unblocked key reaches [`RateLimiter::allow`], which may itself set a
    /// fresh block.
    pub async fn check(&self, resolved: &ResolvedKey) -> Decision {
        let key = resolved.key.store_key();

        let decision = if self.limiter.is_blocked(&key).await {
            Decision::Blocked
        } else if self
            .limiter
            .allow(&key, resolved.limit, self.block_duration)
            .await
        {
            Decision::Admitted
        } else {
            Decision::Rejected
        };

        debug!(
            identity = %resolved.key,
            limit = resolved.limit,
            decision = ?decision,
            "Admission decision made"
        );

        decision
    }
}
