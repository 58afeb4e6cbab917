//! AND-evaluation of permission sets

use tracing::trace;

use super::cache::{CacheStats, GrantCache};
use crate::authorizer::AuthorizerRegistry;
use crate::error::Result;
use crate::permission::Perm;

/// Evaluates permission sets for one apply cycle
///
/// A set is granted iff every member is granted; the empty set is granted.
/// Evaluation stops at the first denial. Each distinct permission reaches its
/// authorizer at most once per `EvaluationEngine`.
pub struct EvaluationEngine<'a> {
    authorizers: &'a AuthorizerRegistry,
    cache: GrantCache,
    authorizer_calls: usize,
}

impl<'a> EvaluationEngine<'a> {
    /// Start a cycle against `authorizers`
    pub fn new(authorizers: &'a AuthorizerRegistry, cache_capacity: usize) -> Self {
        Self {
            authorizers,
            cache: GrantCache::with_capacity(cache_capacity),
            authorizer_calls: 0,
        }
    }

    /// Whether every permission in `permissions` is granted
    pub fn evaluate<'p>(
        &mut self,
        permissions: impl IntoIterator<Item = &'p Perm>,
    ) -> Result<bool> {
        for permission in permissions {
            if !self.is_granted(permission)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether a single permission is granted, consulting the cycle cache first
    pub fn is_granted(&mut self, permission: &Perm) -> Result<bool> {
        if let Some(granted) = self.cache.get(permission) {
            return Ok(granted);
        }

        let granted = self.authorizers.is_granted(permission)?;
        self.authorizer_calls += 1;
        trace!(?permission, granted, "permission evaluated");

        self.cache.insert(permission.clone(), granted);
        Ok(granted)
    }

    /// Number of authorizer invocations so far
    pub fn authorizer_calls(&self) -> usize {
        self.authorizer_calls
    }

    /// Cache counters for this cycle
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
