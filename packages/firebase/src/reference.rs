//! References to locations in the remote tree.
//!
//! A [`Reference`] holds a URL plus request configuration (query parameters,
//! headers, an optional shared auth token, a timeout). Every setting can be
//! changed through `&self` from any thread. Derived references get their own
//! copy of the parameters and headers; only the shared auth token and the
//! executor are shared with the source.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::AuthToken;
use crate::config::{ClientConfig, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};
use crate::executor::{parse_header, Deadline, HttpExecutor, ReqwestExecutor};
use crate::location;
use crate::query::{self, QueryParams};
use crate::types::{Method, RawRequest, RawResponse};

#[derive(Debug, Clone, Default)]
struct Settings {
    params: QueryParams,
    headers: HeaderMap,
    shared_auth: Option<Arc<AuthToken>>,
}

/// Body of a successful push: the key the store generated.
#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

/// A location in the remote store plus how to talk to it.
pub struct Reference {
    url: RwLock<String>,
    settings: RwLock<Settings>,
    timeout: RwLock<Duration>,
    executor: Arc<dyn HttpExecutor>,
}

impl Reference {
    /// Root reference with a fresh connection pool and default settings.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, &ClientConfig::default())
    }

    /// Root reference with an executor built from `config`.
    pub fn with_config(url: &str, config: &ClientConfig) -> Result<Self> {
        let executor = ReqwestExecutor::new(config)?;
        let reference = Self::with_executor(url, Arc::new(executor));
        reference.set_timeout(config.timeout);
        Ok(reference)
    }

    /// Root reference sending through `executor`.
    pub fn with_executor(url: &str, executor: Arc<dyn HttpExecutor>) -> Self {
        Self {
            url: RwLock::new(location::sanitize_url(url)),
            settings: RwLock::new(Settings::default()),
            timeout: RwLock::new(DEFAULT_TIMEOUT),
            executor,
        }
    }

    fn read_settings(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_settings(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The stored URL, without query string.
    pub fn url(&self) -> String {
        self.url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Point this reference somewhere else. The input is normalized first.
    pub fn set_url(&self, url: &str) {
        let url = location::sanitize_url(url);
        *self.url.write().unwrap_or_else(PoisonError::into_inner) = url;
    }

    /// Budget the next request will get.
    pub fn timeout(&self) -> Duration {
        *self.timeout.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Budget for later requests; requests already in flight keep theirs.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write().unwrap_or_else(PoisonError::into_inner) = timeout;
    }

    /// Set the local `auth` query parameter.
    pub fn auth(&self, token: impl Into<String>) {
        self.write_settings().params.set(query::AUTH, token);
    }

    /// Remove the local `auth` query parameter.
    pub fn unauth(&self) {
        self.write_settings().params.remove(query::AUTH);
    }

    /// Bind a shared token. While bound, its current value is sent as `auth`
    /// in place of any local `auth` parameter.
    pub fn set_shared_auth(&self, auth: &Arc<AuthToken>) {
        self.write_settings().shared_auth = Some(Arc::clone(auth));
    }

    /// Unbind the shared token; the local `auth` parameter applies again.
    pub fn clear_shared_auth(&self) {
        self.write_settings().shared_auth = None;
    }

    /// Send `name: value` with every request from this reference.
    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.write_settings().headers.insert(name, value);
        Ok(())
    }

    /// Stop sending `name`.
    pub fn remove_header(&self, name: &str) {
        self.write_settings().headers.remove(name);
    }

    /// Snapshot of the local query parameters.
    pub fn query_params(&self) -> QueryParams {
        self.read_settings().params.clone()
    }

    /// The request target: `<url>/.json`, plus the encoded parameters.
    ///
    /// The settings lock is held only to copy the parameters out.
    pub fn resolve(&self) -> String {
        let (mut params, shared_auth) = {
            let settings = self.read_settings();
            (settings.params.clone(), settings.shared_auth.clone())
        };
        if let Some(auth) = shared_auth {
            params.set(query::AUTH, auth.get());
        }

        let mut target = format!("{}/.json", self.url());
        if !params.is_empty() {
            target.push('?');
            target.push_str(&params.encode());
        }
        target
    }

    /// Reference to a child location, configured like this one.
    pub fn child(&self, segment: &str) -> Reference {
        let child = self.clone();
        let url = location::join_child(&child.url(), segment);
        *child.url.write().unwrap_or_else(PoisonError::into_inner) = url;
        child
    }

    /// Reference to `path` on the same scheme and host, configured like this
    /// one.
    pub fn reroot(&self, path: &str) -> Result<Reference> {
        let url = location::reroot(&self.url(), path)?;
        let rerooted = self.clone();
        *rerooted.url.write().unwrap_or_else(PoisonError::into_inner) = url;
        Ok(rerooted)
    }

    /// Store `value` under a key generated by the store and return a
    /// reference to it.
    pub fn push<T: Serialize + ?Sized>(&self, value: &T) -> Result<Reference> {
        let body = serde_json::to_vec(value)?;
        let response = self.create(Some(body))?;
        let PushResponse { name } = serde_json::from_slice(&response.body)?;
        if name.is_empty() {
            return Err(Error::Serialization {
                message: "push response has an empty `name`".to_string(),
            });
        }
        Ok(self.child(&name))
    }

    /// Replace the value at this location.
    pub fn set<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.replace(Some(body))?;
        Ok(())
    }

    /// Update only the named children.
    pub fn update<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.merge(Some(body))?;
        Ok(())
    }

    /// Read and decode the value at this location.
    pub fn value<T: DeserializeOwned>(&self) -> Result<T> {
        let response = self.read()?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Delete this location and everything under it.
    pub fn remove(&self) -> Result<()> {
        self.delete()?;
        Ok(())
    }

    /// POST `body`; the store appends it under a generated key.
    pub fn create(&self, body: Option<Vec<u8>>) -> Result<RawResponse> {
        self.execute(Method::POST, body)
    }

    /// PUT `body` over the value at this location.
    pub fn replace(&self, body: Option<Vec<u8>>) -> Result<RawResponse> {
        self.execute(Method::PUT, body)
    }

    /// PATCH `body` into the named children.
    pub fn merge(&self, body: Option<Vec<u8>>) -> Result<RawResponse> {
        self.execute(Method::PATCH, body)
    }

    /// GET the value at this location.
    pub fn read(&self) -> Result<RawResponse> {
        self.execute(Method::GET, None)
    }

    /// DELETE this location and everything under it.
    pub fn delete(&self) -> Result<RawResponse> {
        self.execute(Method::DELETE, None)
    }

    fn execute(&self, method: Method, body: Option<Vec<u8>>) -> Result<RawResponse> {
        let headers = self.read_settings().headers.clone();
        let mut request = RawRequest::new(method, self.resolve()).with_headers(headers);
        if let Some(body) = body {
            request = request.with_body(body);
        }

        let timeout = self.timeout();
        debug!(%method, url = %self.url(), ?timeout, "sending request");

        let response = self.executor.execute(request, Deadline::start(timeout))?;
        if !response.is_success() {
            debug!(%method, url = %self.url(), status = response.status, "remote error");
            return Err(Error::Remote {
                status: response.status,
                message: response.body_text(),
            });
        }
        Ok(response)
    }

    /// Derive with `key` set to `value`, or removed when `value` is `None`.
    fn with_param(&self, key: &str, value: Option<String>) -> Reference {
        let derived = self.clone();
        {
            let mut settings = derived.write_settings();
            match value {
                Some(value) => settings.params.set(key, value),
                None => settings.params.remove(key),
            }
        }
        derived
    }

    /// Only fetch keys at this level, values truncated to `true`.
    pub fn shallow(&self, enabled: bool) -> Reference {
        self.with_param(query::SHALLOW, enabled.then(|| "true".to_string()))
    }

    /// Include priority metadata (`format=export`).
    pub fn include_priority(&self, enabled: bool) -> Reference {
        self.with_param(
            query::FORMAT,
            enabled.then(|| query::FORMAT_EXPORT.to_string()),
        )
    }

    /// Order results by `key` (`$key`, `$value`, or a child name).
    pub fn order_by(&self, key: &str) -> Reference {
        self.with_filter(query::ORDER_BY, key)
    }

    /// Only return children equal to `value`.
    pub fn equal_to(&self, value: &str) -> Reference {
        self.with_filter(query::EQUAL_TO, value)
    }

    /// Only return children at or after `value`.
    pub fn start_at(&self, value: &str) -> Reference {
        self.with_filter(query::START_AT, value)
    }

    /// Only return children at or before `value`.
    pub fn end_at(&self, value: &str) -> Reference {
        self.with_filter(query::END_AT, value)
    }

    /// Keep the first `limit` results; `0` removes the limit.
    pub fn limit_to_first(&self, limit: u64) -> Reference {
        self.with_limit(query::LIMIT_TO_FIRST, limit)
    }

    /// Keep the last `limit` results; `0` removes the limit.
    pub fn limit_to_last(&self, limit: u64) -> Reference {
        self.with_limit(query::LIMIT_TO_LAST, limit)
    }

    fn with_filter(&self, key: &str, value: &str) -> Reference {
        let value = (!value.is_empty()).then(|| query::escape_value(value));
        self.with_param(key, value)
    }

    fn with_limit(&self, key: &str, limit: u64) -> Reference {
        self.with_param(key, (limit > 0).then(|| limit.to_string()))
    }
}

/// Independent copy: parameters and headers are deep-copied, the shared auth
/// token and the executor are shared.
impl Clone for Reference {
    fn clone(&self) -> Self {
        let settings = self.read_settings().clone();
        Self {
            url: RwLock::new(self.url()),
            settings: RwLock::new(settings),
            timeout: RwLock::new(self.timeout()),
            executor: Arc::clone(&self.executor),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resolve())
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("url", &self.url())
            .field("timeout", &self.timeout())
            .finish_non_exhaustive()
    }
}
