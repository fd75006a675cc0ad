//! Stub registry and the client builder that owns it.

use crate::client::StubHttpClient;
use crate::config::{ClientConfig, OpaqueValue, Redirect, StubberConfig, Version};
use crate::error::Result;
use crate::matcher::{RequestMatcher, UriMatcher};
use crate::response::Reply;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A matcher and what to answer when it matches.
pub struct Stub {
    matcher: Box<dyn RequestMatcher>,
    reply: Reply,
}

impl Stub {
    pub fn new(matcher: impl RequestMatcher + 'static, reply: impl Into<Reply>) -> Self {
        Self {
            matcher: Box::new(matcher),
            reply: reply.into(),
        }
    }

    pub fn matcher(&self) -> &dyn RequestMatcher {
        self.matcher.as_ref()
    }

    pub fn reply(&self) -> &Reply {
        &self.reply
    }
}

impl fmt::Debug for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("matcher", &self.matcher.to_string())
            .field("reply", &self.reply)
            .finish()
    }
}

/// Ordered stub list shared between a builder and the clients it built.
///
/// Clones share the same list. The lock is only held to append, clear or copy
/// the list; matching always runs on a [`StubList::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct StubList {
    inner: Arc<RwLock<Vec<Arc<Stub>>>>,
}

impl StubList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, stub: Stub) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(stub));
    }

    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The stubs registered right now, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Stub>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Builder for [`StubHttpClient`]s.
///
/// Configuration setters mirror a real HTTP client builder; their values are
/// only reported back by the client. Stubs are matched in registration order
/// and the first match wins, so register the more specific ones first.
///
/// ```
/// use http_client_stubber::{BodyHandlers, HttpClient, HttpClientStubber, HttpRequest, StubResponse};
///
/// let client = HttpClientStubber::new()
///     .with_response("http://example.com/hello", StubResponse::new().text("hello world"))
///     .unwrap()
///     .build();
///
/// let request = HttpRequest::builder("http://example.com/hello").build().unwrap();
/// let response = client.send(&request, &BodyHandlers::of_string()).unwrap();
/// assert_eq!(response.body(), "hello world");
/// ```
#[derive(Debug, Clone, Default)]
pub struct HttpClientStubber {
    config: ClientConfig,
    stubs: StubList,
}

impl HttpClientStubber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cookie_handler(mut self, cookie_handler: OpaqueValue) -> Self {
        self.config.cookie_handler = Some(cookie_handler);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    pub fn follow_redirects(mut self, policy: Redirect) -> Self {
        self.config.follow_redirects = Some(policy);
        self
    }

    pub fn proxy(mut self, proxy: Url) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    pub fn ssl_context(mut self, ssl_context: OpaqueValue) -> Self {
        self.config.ssl_context = Some(ssl_context);
        self
    }

    pub fn ssl_parameters(mut self, ssl_parameters: OpaqueValue) -> Self {
        self.config.ssl_parameters = Some(ssl_parameters);
        self
    }

    pub fn authenticator(mut self, authenticator: OpaqueValue) -> Self {
        self.config.authenticator = Some(authenticator);
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.config.version = Some(version);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.config.priority = priority;
        self
    }

    pub fn executor(mut self, executor: tokio::runtime::Handle) -> Self {
        self.config.executor = Some(executor);
        self
    }

    /// Bound on request body capture when a client dumps an unmatched request.
    ///
    /// Body matchers carry their own bound, see [`crate::BodyMatcher::with_timeout`].
    pub fn body_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.body_read_timeout = timeout;
        self
    }

    /// Answer `uri` with an empty `200` response.
    pub fn with_stub(self, uri: &str) -> Result<Self> {
        self.with_response(uri, Reply::default())
    }

    /// Answer `uri` with `reply`.
    pub fn with_response(self, uri: &str, reply: impl Into<Reply>) -> Result<Self> {
        let matcher = UriMatcher::new(uri)?;
        Ok(self.with_matcher(matcher, reply))
    }

    /// Answer requests accepted by `matcher` with `reply`.
    pub fn with_matcher(self, matcher: impl RequestMatcher + 'static, reply: impl Into<Reply>) -> Self {
        self.stubs.push(Stub::new(matcher, reply));
        self
    }

    /// The live stub list, shared with every client built from this builder.
    pub fn stubs(&self) -> &StubList {
        &self.stubs
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A client with a snapshot of the current configuration, bound to the live
    /// stub list.
    pub fn build(&self) -> StubHttpClient {
        StubHttpClient::new(self.config.clone(), self.stubs.clone())
    }

    /// A builder with the settings and enabled stubs of `config`.
    pub fn from_config(config: &StubberConfig) -> Result<Self> {
        let stubber = Self {
            config: config.client.client_config()?,
            stubs: StubList::new(),
        };

        for stub in &config.stubs {
            if !stub.enabled {
                debug!(stub_id = %stub.id, "Skipping disabled stub");
                continue;
            }
            let matcher = stub.request.compile()?;
            stubber.stubs.push(Stub {
                matcher,
                reply: stub.reply()?,
            });
        }

        debug!(stubs = stubber.stubs.len(), "Registered stubs from configuration");
        Ok(stubber)
    }

    /// Parse YAML stub definitions.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config = StubberConfig::from_yaml(yaml)?;
        Ok(Self::from_config(&config)?)
    }

    /// Load YAML stub definitions from a file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let config = StubberConfig::from_file(path)?;
        Self::from_config(&config)
            .map_err(|e| anyhow::anyhow!("Failed to load stubs from {}: {}", path.display(), e))
    }
}
