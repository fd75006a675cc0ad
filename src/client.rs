//! The HTTP client surface and its stub implementation.
//!
//! [`StubHttpClient`] answers every request from its stub list without touching
//! the network. Each send walks the stubs in registration order:
//!
//! - the first stub whose matcher accepts the request answers it;
//! - a [`Reply::NetworkError`] stub fails the call with [`Error::Network`];
//! - when nothing matches, the call fails with [`Error::NoMatch`], whose message
//!   dumps the request and every registered matcher.
//!
//! Responses travel through the caller's [`BodyHandler`] exactly as they would
//! from a real server: the handler's subscriber is offered the whole content as
//! one chunk on its first demand, then completion.

use crate::body::{BodyHandler, BodyReader, BodySubscriber};
use crate::config::{ClientConfig, OpaqueValue, Redirect, Version};
use crate::error::{Error, Result};
use crate::flow::OneShotSubscription;
use crate::matcher::indent;
use crate::request::HttpRequest;
use crate::response::{HttpResponse, Reply, StubResponse};
use crate::stubber::{Stub, StubList};
use futures::future::{self, BoxFuture, FutureExt};
use std::fmt::{self, Write as _};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use url::Url;

/// Future resolving to a delivered response.
pub type ResponseFuture<T> = BoxFuture<'static, Result<HttpResponse<T>>>;

/// Decides what to do with server-pushed responses.
pub trait PushPromiseHandler<T>: Send + Sync {
    /// Called for each push promise; `acceptor` accepts the push with a body handler.
    fn apply_push_promise(
        &self,
        initiating: &HttpRequest,
        push_promise: &HttpRequest,
        acceptor: &mut dyn FnMut(Box<dyn BodyHandler<T>>) -> ResponseFuture<T>,
    );
}

/// An asynchronous HTTP client.
pub trait HttpClient: Send + Sync {
    fn cookie_handler(&self) -> Option<OpaqueValue>;

    fn connect_timeout(&self) -> Option<Duration>;

    fn follow_redirects(&self) -> Option<Redirect>;

    fn proxy(&self) -> Option<&Url>;

    fn ssl_context(&self) -> Option<OpaqueValue>;

    fn ssl_parameters(&self) -> Option<OpaqueValue>;

    fn authenticator(&self) -> Option<OpaqueValue>;

    fn version(&self) -> Option<Version>;

    fn executor(&self) -> Option<tokio::runtime::Handle>;

    /// Send `request`, blocking until the body has been decoded by `handler`.
    fn send<T: Send + 'static>(
        &self,
        request: &HttpRequest,
        handler: &dyn BodyHandler<T>,
    ) -> Result<HttpResponse<T>>;

    /// Send `request`, resolving the returned future with the response.
    fn send_async<T: Send + 'static>(
        &self,
        request: &HttpRequest,
        handler: &dyn BodyHandler<T>,
    ) -> ResponseFuture<T>;

    /// Like [`HttpClient::send_async`], also accepting server pushes.
    fn send_async_with_push_promise<T: Send + 'static>(
        &self,
        request: &HttpRequest,
        handler: &dyn BodyHandler<T>,
        push_promise_handler: &dyn PushPromiseHandler<T>,
    ) -> Result<ResponseFuture<T>>;
}

/// Client that answers from a stub list instead of the network.
///
/// Built by [`crate::HttpClientStubber::build`]. The configuration is a snapshot
/// taken at build time; the stub list is live, so stubs registered afterwards
/// are seen by the next send.
#[derive(Clone)]
pub struct StubHttpClient {
    config: Arc<ClientConfig>,
    stubs: StubList,
    reader: BodyReader,
}

impl StubHttpClient {
    pub(crate) fn new(config: ClientConfig, stubs: StubList) -> Self {
        let reader = BodyReader::new(config.body_read_timeout);
        Self {
            config: Arc::new(config),
            stubs,
            reader,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn stubs(&self) -> &StubList {
        &self.stubs
    }

    /// Render a request the way no-match failures show it:
    ///
    /// ```text
    /// POST http://example.com/login
    /// --- Headers ---
    ///   content-type: application/json
    /// --- Body ---
    /// {"user":"me"}
    /// ```
    ///
    /// A body that cannot be read is rendered as `Error reading body: <reason>`.
    pub fn describe_request(&self, request: &HttpRequest) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} {}", request.method(), request.uri());
        out.push_str("--- Headers ---\n");
        for name in request.headers().keys() {
            let values: Vec<_> = request
                .headers()
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()))
                .collect();
            let _ = writeln!(out, "  {}: {}", name, values.join(", "));
        }
        out.push_str("--- Body ---\n");
        if let Some(publisher) = request.body_publisher() {
            match self.reader.read(publisher) {
                Ok(body) => out.push_str(&body),
                Err(e) => {
                    let _ = write!(out, "Error reading body: {}", e);
                }
            }
        }
        out
    }

    fn describe_stubs(stubs: &[Arc<Stub>]) -> String {
        let mut out = String::from("StubHttpClient with stubs:\n");
        for stub in stubs {
            let description = indent(&stub.matcher().to_string());
            let _ = writeln!(out, "  {}", description);
        }
        out
    }

    /// Push the whole content as a single chunk on the first demand, whatever its size.
    fn release<T>(
        subscription: &OneShotSubscription,
        subscriber: &mut dyn BodySubscriber<T>,
        response: &StubResponse,
    ) {
        if subscription.take_release() {
            subscriber.on_next(vec![response.raw_content().clone()]);
            subscriber.on_complete();
        }
    }

    fn deliver<T: Send + 'static>(
        &self,
        request: &HttpRequest,
        response: &StubResponse,
        handler: &dyn BodyHandler<T>,
    ) -> Result<HttpResponse<T>> {
        let mut subscriber = handler.apply(response);
        let subscription = OneShotSubscription::new();
        subscriber.on_subscribe(Box::new(subscription.clone()));
        Self::release(&subscription, subscriber.as_mut(), response);

        // Demand may also arrive once the body is asked for.
        let body = subscriber.body();
        Self::release(&subscription, subscriber.as_mut(), response);

        let body = match body.now_or_never() {
            Some(Ok(body)) => body,
            Some(Err(e)) => return Err(Error::Io(e)),
            None => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "body subscriber never requested data or did not complete",
                )))
            }
        };

        debug!(
            status = response.status_code(),
            length = response.raw_content().len(),
            "Delivered stubbed response"
        );
        Ok(HttpResponse::delivered(response, request.uri().clone(), body))
    }
}

/// Renders the request only when a log line is actually emitted.
struct RequestDump<'a> {
    client: &'a StubHttpClient,
    request: &'a HttpRequest,
}

impl fmt::Display for RequestDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.client.describe_request(self.request))
    }
}

impl HttpClient for StubHttpClient {
    fn cookie_handler(&self) -> Option<OpaqueValue> {
        self.config.cookie_handler.clone()
    }

    fn connect_timeout(&self) -> Option<Duration> {
        self.config.connect_timeout
    }

    fn follow_redirects(&self) -> Option<Redirect> {
        self.config.follow_redirects
    }

    fn proxy(&self) -> Option<&Url> {
        self.config.proxy.as_ref()
    }

    fn ssl_context(&self) -> Option<OpaqueValue> {
        self.config.ssl_context.clone()
    }

    fn ssl_parameters(&self) -> Option<OpaqueValue> {
        self.config.ssl_parameters.clone()
    }

    fn authenticator(&self) -> Option<OpaqueValue> {
        self.config.authenticator.clone()
    }

    fn version(&self) -> Option<Version> {
        self.config.version
    }

    fn executor(&self) -> Option<tokio::runtime::Handle> {
        self.config.executor.clone()
    }

    fn send<T: Send + 'static>(
        &self,
        request: &HttpRequest,
        handler: &dyn BodyHandler<T>,
    ) -> Result<HttpResponse<T>> {
        let stubs = self.stubs.snapshot();
        debug!(stubs = %Self::describe_stubs(&stubs), "Given");
        let dump = RequestDump { client: self, request };
        debug!(request = %dump, "Given");

        for (index, stub) in stubs.iter().enumerate() {
            trace!(index, "Trying to match stub");
            if !stub.matcher().matches(request)? {
                trace!(index, "This is NOT a match");
                continue;
            }

            info!(
                index,
                method = %request.method(),
                uri = %request.uri(),
                "This is a match"
            );

            return match stub.reply() {
                Reply::NetworkError => {
                    warn!(uri = %request.uri(), "Simulating network error");
                    Err(Error::Network(request.uri().clone()))
                }
                Reply::Respond(response) => self.deliver(request, response, handler),
            };
        }

        warn!(
            method = %request.method(),
            uri = %request.uri(),
            stubs = stubs.len(),
            "No match found"
        );
        Err(Error::NoMatch {
            request: self.describe_request(request),
            stubs: Self::describe_stubs(&stubs),
        })
    }

    fn send_async<T: Send + 'static>(
        &self,
        request: &HttpRequest,
        handler: &dyn BodyHandler<T>,
    ) -> ResponseFuture<T> {
        future::ready(self.send(request, handler)).boxed()
    }

    fn send_async_with_push_promise<T: Send + 'static>(
        &self,
        _request: &HttpRequest,
        _handler: &dyn BodyHandler<T>,
        _push_promise_handler: &dyn PushPromiseHandler<T>,
    ) -> Result<ResponseFuture<T>> {
        Err(Error::Unsupported("sending with a push promise handler"))
    }
}

impl fmt::Display for StubHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Self::describe_stubs(&self.stubs.snapshot()))
    }
}

impl fmt::Debug for StubHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubHttpClient")
            .field("config", &self.config)
            .field("stubs", &self.stubs.len())
            .finish()
    }
}
