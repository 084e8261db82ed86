//! HTTP execution abstraction.
//!
//! References talk to the network only through [`HttpExecutor`], so tests can
//! swap in a mock and callers can bring their own transport. The executor is
//! shared by every reference derived from the same root.

use std::fmt;
use std::time::{Duration, Instant};

use http::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{Client, Response};
use tokio::runtime::{self, Runtime};
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::redirect::RedirectPolicy;
use crate::types::{Method, RawRequest, RawResponse};

/// Transport failure category. Callers decide on retries from this alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connecting or awaiting response headers ran out of budget.
    Timeout,
    /// The redirect policy refused another hop.
    TooManyRedirects { hops: usize },
    /// DNS, refused connection, broken read, and everything else.
    Other,
}

/// Failure reported by an [`HttpExecutor`].
#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    /// Error of `kind` with no underlying cause.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Deadline failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    /// Any non-timeout transport failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// Redirect chain of `hops` requests refused by the policy.
    pub fn too_many_redirects(hops: usize) -> Self {
        Self::new(
            TransportErrorKind::TooManyRedirects { hops },
            format!("{} consecutive requests (redirects)", hops),
        )
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Failure category.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Shorthand for a [`TransportErrorKind::Timeout`] kind.
    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransportErrorKind::Timeout => write!(f, "timeout: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        // The URL carries the auth token in its query string.
        let error = error.without_url();
        let kind = if error.is_timeout() {
            TransportErrorKind::Timeout
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, error.to_string()).with_source(error)
    }
}

/// One request's time budget, started when the request is issued.
///
/// The same budget covers connecting and awaiting response headers: whatever
/// the dial uses is no longer available for the header wait.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start the clock on `budget` now.
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// The full budget this deadline started with.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time since the deadline started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Budget left right now, zero once exhausted.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    /// True once nothing is left of the budget.
    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Time left for awaiting headers after a dial that took
    /// `connect_elapsed`. `None` means the wait must fail immediately.
    pub fn header_budget(&self, connect_elapsed: Duration) -> Option<Duration> {
        self.budget
            .checked_sub(connect_elapsed)
            .filter(|left| !left.is_zero())
    }
}

/// Trait for executing HTTP requests.
///
/// Implementations must report timeouts with [`TransportErrorKind::Timeout`]
/// and consult their redirect policy before following each hop. The returned
/// response body has been read to completion.
pub trait HttpExecutor: Send + Sync {
    /// Send `request`, following redirects, within `deadline`.
    fn execute(
        &self,
        request: RawRequest,
        deadline: Deadline,
    ) -> Result<RawResponse, TransportError>;
}

/// Production executor over a pooled reqwest client driven by its own runtime.
///
/// The deadline bounds connecting and awaiting response headers only; the
/// body is read afterwards without it. Redirects are followed here rather
/// than by reqwest so the policy can put the original headers back on every
/// hop.
pub struct ReqwestExecutor {
    client: Client,
    runtime: Runtime,
    redirect: RedirectPolicy,
}

impl ReqwestExecutor {
    /// Build the connection pool and runtime from `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let (name, value) = parse_header(name, value)?;
            headers.append(name, value);
        }

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(config.user_agent.clone())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .default_headers(headers)
            .build()
            .map_err(TransportError::from)?;

        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("firebase-rest-io")
            .enable_all()
            .build()
            .map_err(|e| TransportError::other("failed to start I/O runtime").with_source(e))?;

        Ok(Self {
            client,
            runtime,
            redirect: RedirectPolicy::new(config.max_redirects),
        })
    }

    /// Executor built from [`ClientConfig::default`].
    pub fn with_default_config() -> Result<Self, Error> {
        Self::new(&ClientConfig::default())
    }

    /// Policy consulted before each redirect hop.
    pub fn redirect_policy(&self) -> RedirectPolicy {
        self.redirect
    }

    /// Send one hop and wait for its response headers within what is left of
    /// `deadline`.
    fn send(&self, request: &RawRequest, deadline: &Deadline) -> Result<Response, TransportError> {
        let remaining = deadline.remaining();
        if remaining.is_zero() {
            return Err(TransportError::timeout(format!(
                "request budget of {:?} exhausted before sending",
                deadline.budget()
            )));
        }

        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        self.runtime.block_on(async move {
            match tokio::time::timeout(remaining, builder.send()).await {
                Ok(sent) => sent.map_err(TransportError::from),
                Err(elapsed) => Err(TransportError::timeout(format!(
                    "no response headers within {:?}",
                    deadline.budget()
                ))
                .with_source(elapsed)),
            }
        })
    }

    /// Read the body to the end, outside the request deadline.
    fn read_body(&self, response: Response) -> Result<Vec<u8>, TransportError> {
        let body = self.runtime.block_on(response.bytes())?;
        Ok(body.to_vec())
    }
}

impl HttpExecutor for ReqwestExecutor {
    fn execute(
        &self,
        request: RawRequest,
        deadline: Deadline,
    ) -> Result<RawResponse, TransportError> {
        let mut via: Vec<RawRequest> = Vec::new();
        let mut current = request;

        loop {
            let response = self.send(&current, &deadline)?;
            let status = response.status().as_u16();

            let Some(mut next) = redirect_request(&current, &response)? else {
                let headers = response.headers().clone();
                let body = self.read_body(response)?;
                return Ok(RawResponse {
                    status,
                    headers,
                    body,
                });
            };

            // Drain so the connection goes back to the pool.
            self.read_body(response)?;

            via.push(current);
            self.redirect.check(&mut next, &via)?;
            debug!(hop = via.len(), status, method = %next.method, "following redirect");
            current = next;
        }
    }
}

/// Build the follow-up request for a redirect response, if it is one.
///
/// 301/302/303 switch to a bodiless GET unless the request was already
/// GET or HEAD; 307/308 keep method and body. Headers are left empty for the
/// redirect policy to fill in.
fn redirect_request(
    current: &RawRequest,
    response: &Response,
) -> Result<Option<RawRequest>, TransportError> {
    let (method, body) = match response.status().as_u16() {
        301 | 302 | 303 => match current.method {
            Method::GET | Method::HEAD => (current.method, None),
            _ => (Method::GET, None),
        },
        307 | 308 => (current.method, current.body.clone()),
        _ => return Ok(None),
    };

    let Some(location) = response.headers().get(LOCATION) else {
        return Ok(None);
    };
    let location = location
        .to_str()
        .map_err(|e| TransportError::other("redirect location is not valid text").with_source(e))?;

    let base = Url::parse(&current.url)
        .map_err(|e| TransportError::other("request URL does not parse").with_source(e))?;
    let target = base
        .join(location)
        .map_err(|e| TransportError::other("redirect location does not parse").with_source(e))?;

    Ok(Some(RawRequest {
        method,
        url: target.into(),
        headers: HeaderMap::new(),
        body,
    }))
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), Error> {
    let header_name = HeaderName::try_from(name).map_err(|e| Error::InvalidHeader {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    let header_value = HeaderValue::try_from(value).map_err(|e| Error::InvalidHeader {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    Ok((header_name, header_value))
}
