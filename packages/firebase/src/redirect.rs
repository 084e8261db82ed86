//! Redirect hook consulted by the executor before following each hop.
//!
//! Many HTTP stacks drop custom headers (notably `Authorization`) when they
//! follow a redirect. The policy puts the first request's headers back onto
//! every follow-up request.

use tracing::warn;

use crate::executor::TransportError;
use crate::types::RawRequest;

pub const DEFAULT_REDIRECT_LIMIT: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectPolicy {
    limit: usize,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_REDIRECT_LIMIT)
    }
}

impl RedirectPolicy {
    /// Policy allowing `limit` redirect hops.
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Hops allowed before a request fails.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Decide whether `next` may be sent after the requests in `via`
    /// (oldest first), rewriting its headers from `via[0]` when it may.
    ///
    /// Only `next` is mutated; `via` is left untouched.
    pub fn check(&self, next: &mut RawRequest, via: &[RawRequest]) -> Result<(), TransportError> {
        let Some(first) = via.first() else {
            return Ok(());
        };

        if via.len() > self.limit {
            warn!(hops = via.len(), limit = self.limit, "redirect limit exceeded");
            return Err(TransportError::too_many_redirects(via.len()));
        }

        for name in first.headers.keys() {
            next.headers.remove(name);
            for value in first.headers.get_all(name) {
                next.headers.append(name.clone(), value.clone());
            }
        }
        Ok(())
    }
}
