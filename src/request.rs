//! Outbound request model.
//!
//! Requests carry a method, a URI, a case-insensitive header multimap and an
//! optional body publisher that streams the body through the push protocol in
//! [`crate::flow`]. A publisher can be subscribed any number of times; every
//! subscription replays the whole body.

use crate::config::Version;
use crate::error::{Error, Result};
use crate::flow::{DemandSubscription, Publisher, Subscriber};
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Publisher of a request body.
pub trait BodyPublisher: Publisher<Bytes> {
    /// Body length in bytes, when known up front.
    fn content_length(&self) -> Option<u64>;
}

/// Publisher over an in-memory list of chunks, delivered synchronously on demand.
#[derive(Debug, Clone, Default)]
pub struct BytesPublisher {
    chunks: Vec<Bytes>,
}

impl BytesPublisher {
    pub fn new(chunks: Vec<Bytes>) -> Self {
        Self { chunks }
    }
}

impl Publisher<Bytes> for BytesPublisher {
    fn subscribe(&self, mut subscriber: Box<dyn Subscriber<Bytes>>) {
        let subscription = DemandSubscription::new();
        subscriber.on_subscribe(Box::new(subscription.clone()));

        for chunk in &self.chunks {
            // Demand can only grow from inside our own callbacks, so running out
            // of it means the stream stalls for good.
            if !subscription.try_take() {
                return;
            }
            subscriber.on_next(chunk.clone());
        }

        if !subscription.is_cancelled() {
            subscriber.on_complete();
        }
    }
}

impl BodyPublisher for BytesPublisher {
    fn content_length(&self) -> Option<u64> {
        Some(self.chunks.iter().map(|c| c.len() as u64).sum())
    }
}

/// Factories for the common request body publishers.
pub struct BodyPublishers;

impl BodyPublishers {
    /// The UTF-8 encoding of `body`, as a single chunk.
    pub fn of_string(body: impl Into<String>) -> BytesPublisher {
        BytesPublisher::new(vec![Bytes::from(body.into())])
    }

    pub fn of_bytes(body: impl Into<Bytes>) -> BytesPublisher {
        BytesPublisher::new(vec![body.into()])
    }

    /// Several chunks, pushed one per unit of demand.
    pub fn of_chunks<I, B>(chunks: I) -> BytesPublisher
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        BytesPublisher::new(chunks.into_iter().map(Into::into).collect())
    }

    /// The content of a file, read eagerly.
    pub fn of_file(path: impl AsRef<Path>) -> Result<BytesPublisher> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|source| Error::Resource {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::of_bytes(content))
    }

    /// A body that completes immediately without data.
    pub fn no_body() -> BytesPublisher {
        BytesPublisher::default()
    }
}

/// An outbound HTTP request. Cheap to clone: the body publisher is shared.
#[derive(Clone)]
pub struct HttpRequest {
    method: Method,
    uri: Url,
    headers: HeaderMap,
    body: Option<Arc<dyn BodyPublisher>>,
    timeout: Option<Duration>,
    version: Option<Version>,
}

impl HttpRequest {
    /// Start building a `GET` request for `uri`.
    pub fn builder(uri: &str) -> HttpRequestBuilder {
        HttpRequestBuilder::new(uri)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body publisher; `None` for requests built without a body.
    pub fn body_publisher(&self) -> Option<&dyn BodyPublisher> {
        self.body.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("uri", &self.uri.as_str())
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .field("timeout", &self.timeout)
            .field("version", &self.version)
            .finish()
    }
}

/// Builder for [`HttpRequest`].
///
/// Invalid input is remembered and reported by [`HttpRequestBuilder::build`], so
/// calls can be chained freely.
pub struct HttpRequestBuilder {
    uri: Result<Url>,
    method: Method,
    headers: HeaderMap,
    body: Option<Arc<dyn BodyPublisher>>,
    timeout: Option<Duration>,
    version: Option<Version>,
    error: Option<Error>,
}

impl HttpRequestBuilder {
    fn new(uri: &str) -> Self {
        Self {
            uri: Url::parse(uri).map_err(|e| Error::invalid_uri(uri, e)),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            version: None,
            error: None,
        }
    }

    /// Add a header value, keeping the values already set for `name`.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        let name_parsed = HeaderName::from_bytes(name.as_bytes());
        let value_parsed = HeaderValue::from_str(value);
        match (name_parsed, value_parsed) {
            (Ok(n), Ok(v)) => {
                self.headers.append(n, v);
            }
            (Err(e), _) => self.error = Some(Error::invalid_header(name, e)),
            (_, Err(e)) => self.error = Some(Error::invalid_header(name, e)),
        }
        self
    }

    pub fn get(self) -> Self {
        self.method(Method::GET, None::<BytesPublisher>)
    }

    pub fn delete(self) -> Self {
        self.method(Method::DELETE, None::<BytesPublisher>)
    }

    pub fn post(self, body: impl BodyPublisher + 'static) -> Self {
        self.method(Method::POST, Some(body))
    }

    pub fn put(self, body: impl BodyPublisher + 'static) -> Self {
        self.method(Method::PUT, Some(body))
    }

    /// Any method, with or without a body.
    pub fn method<P>(mut self, method: Method, body: Option<P>) -> Self
    where
        P: BodyPublisher + 'static,
    {
        self.method = method;
        self.body = body.map(|b| Arc::new(b) as Arc<dyn BodyPublisher>);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn build(self) -> Result<HttpRequest> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(HttpRequest {
            method: self.method,
            uri: self.uri?,
            headers: self.headers,
            body: self.body,
            timeout: self.timeout,
            version: self.version,
        })
    }
}
