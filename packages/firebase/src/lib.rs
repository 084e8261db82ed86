//! # firebase-rest
//!
//! Blocking REST client for a Firebase-style hierarchical JSON store.
//!
//! A [`Reference`] names one node of the remote tree by URL. Reading and
//! writing through it turns into HTTP requests against `<url>/.json`:
//!
//! ```ignore
//! use std::sync::Arc;
//! use firebase_rest::{AuthToken, Reference};
//!
//! let root = Reference::new("my-app.firebaseio.com")?;
//! let token = Arc::new(AuthToken::new("secret"));
//! root.set_shared_auth(&token);
//!
//! let users = root.child("users");
//! let alice = users.push(&serde_json::json!({"name": "Alice"}))?;
//! alice.update(&serde_json::json!({"age": 30}))?;
//!
//! let first_ten: serde_json::Value = users.order_by("name").limit_to_first(10).value()?;
//! ```
//!
//! ## Derivation
//!
//! [`Reference::child`], [`Reference::reroot`], [`Reference::push`] and the
//! query modifiers return new references with their own copy of the query
//! parameters and headers. The [`AuthToken`] and the [`HttpExecutor`] are the
//! only things shared between derived references.
//!
//! ## Errors
//!
//! Timeouts, other transport failures, non-2xx answers, malformed URLs,
//! (de)serialization failures and redirect loops each have their own
//! [`Error`] variant. Nothing is retried.

pub mod auth;
pub mod config;
pub mod error;
pub mod executor;
pub mod location;
pub mod query;
pub mod redirect;
pub mod reference;
pub mod types;

pub use auth::AuthToken;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, Result};
pub use executor::{Deadline, HttpExecutor, ReqwestExecutor, TransportError, TransportErrorKind};
pub use query::QueryParams;
pub use redirect::RedirectPolicy;
pub use reference::Reference;
pub use types::{Method, RawRequest, RawResponse};
