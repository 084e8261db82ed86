//! Shared credential holder.

use std::sync::{PoisonError, RwLock};

/// A bearer token that many references can read at request time.
///
/// Wrap it in an `Arc` and hand it to [`Reference::set_shared_auth`]; updating
/// the token here is picked up by every bound reference on its next request.
///
/// [`Reference::set_shared_auth`]: crate::Reference::set_shared_auth
#[derive(Debug, Default)]
pub struct AuthToken {
    token: RwLock<String>,
}

impl AuthToken {
    /// Holder starting with `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(token.into()),
        }
    }

    /// Replace the held token.
    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Current token.
    pub fn get(&self) -> String {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
