//! HTTP Client Stubber
//!
//! An in-process stand-in for an asynchronous HTTP client. Tests register stubs
//! (a request matcher plus a canned response or a simulated network error),
//! hand the built client to the code under test, and every request is answered
//! from the stubs without touching the network.
//!
//! # Features
//!
//! - **Request Matching**: Match by exact URI, header value or absence, exact or
//!   regex body, and any combination of those
//! - **Canned Responses**: Text, HTML, JSON, raw bytes or file content, with
//!   content type and length kept in sync
//! - **Streaming Delivery**: Bodies go through the caller's body handler over the
//!   same publisher/subscriber protocol a real client uses
//! - **Failure Injection**: Simulate network errors per stub
//! - **Diagnostics**: Unmatched requests fail with a dump of the request and of
//!   every registered matcher
//! - **YAML Fixtures**: Load stubs from declarative configuration files
//!
//! # Example
//!
//! ```
//! use http_client_stubber::{
//!     BodyHandlers, HttpClient, HttpClientStubber, HttpRequest, Reply, StubResponse,
//! };
//!
//! let client = HttpClientStubber::new()
//!     .with_response("http://example.com/hello", StubResponse::new().json(r#"{"hi":true}"#))
//!     .unwrap()
//!     .with_response("http://example.com/down", Reply::network_error())
//!     .unwrap()
//!     .build();
//!
//! let hello = HttpRequest::builder("http://example.com/hello").build().unwrap();
//! let response = client.send(&hello, &BodyHandlers::of_string()).unwrap();
//! assert_eq!(response.body(), r#"{"hi":true}"#);
//!
//! let down = HttpRequest::builder("http://example.com/down").build().unwrap();
//! let err = client.send(&down, &BodyHandlers::of_string()).unwrap_err();
//! assert_eq!(err.to_string(), "network error for http://example.com/down");
//! ```
//!
//! # Example Configuration
//!
//! ```yaml
//! client:
//!   version: http1.1
//! stubs:
//!   - id: hello-world
//!     request:
//!       type: and
//!       matchers:
//!         - type: uri
//!           uri: http://example.com/hello
//!         - type: header
//!           name: Accept
//!           value: application/json
//!     response:
//!       status: 200
//!       body:
//!         type: json
//!         content:
//!           message: "Hello, World!"
//!   - id: offline
//!     request:
//!       type: uri
//!       uri: http://example.com/down
//!     fault:
//!       type: network_error
//! ```

pub mod body;
pub mod client;
pub mod config;
pub mod error;
pub mod flow;
pub mod matcher;
pub mod request;
pub mod response;
pub mod status;
pub mod stubber;

pub use body::{BodyHandler, BodyHandlers, BodyReader, BodySubscriber};
pub use client::{HttpClient, PushPromiseHandler, ResponseFuture, StubHttpClient};
pub use config::{ClientConfig, OpaqueValue, Redirect, StubberConfig, Version};
pub use error::{Error, Result};
pub use matcher::{AndMatcher, BodyMatcher, HeaderMatcher, RequestMatcher, UriMatcher};
pub use request::{BodyPublisher, BodyPublishers, HttpRequest};
pub use response::{HttpResponse, Reply, ResponseInfo, StubResponse};
pub use status::HttpStatus;
pub use stubber::{HttpClientStubber, Stub, StubList};
