//! Request matching logic.
//!
//! A stub applies to a request when its [`RequestMatcher`] accepts it. Matchers
//! are immutable once built and only read the request; constructor arguments
//! are validated up front so a bad matcher never reaches match time.

use crate::body::BodyReader;
use crate::error::{Error, Result};
use crate::request::HttpRequest;
use http::header::HeaderName;
use regex::Regex;
use std::fmt;
use std::time::Duration;
use tracing::trace;
use url::Url;

/// Predicate deciding whether a stub applies to a request.
///
/// The `Display` rendering describes the matcher in no-match diagnostics. It
/// may span several lines; the client indents continuation lines.
pub trait RequestMatcher: fmt::Display + Send + Sync {
    /// Whether `request` satisfies this matcher.
    ///
    /// Errors abort the whole send instead of being treated as a non-match.
    fn matches(&self, request: &HttpRequest) -> Result<bool>;
}

impl<M: RequestMatcher + ?Sized> RequestMatcher for Box<M> {
    fn matches(&self, request: &HttpRequest) -> Result<bool> {
        (**self).matches(request)
    }
}

/// Matches requests whose URI is exactly the target.
///
/// Both sides are compared as parsed URLs, so the usual URL normalization
/// applies first: scheme and host are case-insensitive, default ports are
/// dropped, and an empty path on `http`/`https` reads as `/`. `http://x` and
/// `http://x/` are the same target. Path, query and fragment compare exactly.
#[derive(Debug, Clone)]
pub struct UriMatcher {
    uri: Url,
}

impl UriMatcher {
    pub fn new(uri: &str) -> Result<Self> {
        let uri = Url::parse(uri).map_err(|e| Error::invalid_uri(uri, e))?;
        Ok(Self { uri })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }
}

impl From<Url> for UriMatcher {
    fn from(uri: Url) -> Self {
        Self { uri }
    }
}

impl RequestMatcher for UriMatcher {
    fn matches(&self, request: &HttpRequest) -> Result<bool> {
        Ok(request.uri() == &self.uri)
    }
}

impl fmt::Display for UriMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "with uri '{}'", self.uri)
    }
}

/// Matches on a header value, or on the absence of a header.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: HeaderName,
    value: Option<String>,
}

impl HeaderMatcher {
    /// With `Some(value)` the header must carry `value` among its values; with
    /// `None` the header must not be present at all.
    pub fn new(name: &str, value: Option<&str>) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::invalid("header name can not be empty"));
        }
        let name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::invalid_header(name, e))?;
        Ok(Self {
            name,
            value: value.map(str::to_string),
        })
    }

    /// Shorthand for a header that must be absent.
    pub fn absent(name: &str) -> Result<Self> {
        Self::new(name, None)
    }
}

impl RequestMatcher for HeaderMatcher {
    fn matches(&self, request: &HttpRequest) -> Result<bool> {
        let mut values = request.headers().get_all(&self.name).iter();
        Ok(match &self.value {
            None => values.next().is_none(),
            Some(expected) => values.any(|v| v.as_bytes() == expected.as_bytes()),
        })
    }
}

impl fmt::Display for HeaderMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "with header '{}' equal to '{}'", self.name, value),
            None => write!(f, "without header '{}'", self.name),
        }
    }
}

#[derive(Debug, Clone)]
enum ExpectedBody {
    Exact(String),
    Pattern { source: String, regex: Regex },
}

/// Matches on the request body, read through a [`BodyReader`].
///
/// A request without a body never matches. Body read failures, including the
/// reader's timeout, are returned as errors.
#[derive(Debug, Clone)]
pub struct BodyMatcher {
    expected: ExpectedBody,
    reader: BodyReader,
}

impl BodyMatcher {
    /// Exact, case-sensitive equality with `body`.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            expected: ExpectedBody::Exact(body.into()),
            reader: BodyReader::default(),
        }
    }

    /// The whole body must match `pattern`.
    pub fn regex(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!(r"\A(?:{})\z", pattern))?;
        Ok(Self {
            expected: ExpectedBody::Pattern {
                source: pattern.to_string(),
                regex,
            },
            reader: BodyReader::default(),
        })
    }

    /// Bound the wait for the request body.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.reader = BodyReader::new(timeout);
        self
    }
}

impl RequestMatcher for BodyMatcher {
    fn matches(&self, request: &HttpRequest) -> Result<bool> {
        let Some(publisher) = request.body_publisher() else {
            return Ok(false);
        };
        let body = self.reader.read(publisher)?;
        trace!(len = body.len(), "Captured request body");

        Ok(match &self.expected {
            ExpectedBody::Exact(expected) => body == *expected,
            ExpectedBody::Pattern { regex, .. } => regex.is_match(&body),
        })
    }
}

impl fmt::Display for BodyMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expected {
            ExpectedBody::Exact(body) => write!(f, "with body '{}'", body),
            ExpectedBody::Pattern { source, .. } => write!(f, "with body matching '{}'", source),
        }
    }
}

/// Indent every line after the first by two spaces. Empty lines, including a
/// trailing newline, stay empty.
pub(crate) fn indent(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut lines = text.split('\n').peekable();
    while let Some(line) = lines.next() {
        out.push_str(line);
        if let Some(next) = lines.peek() {
            out.push('\n');
            if !next.is_empty() {
                out.push_str("  ");
            }
        }
    }
    out
}

/// Matches when every child matches, stopping at the first one that does not.
pub struct AndMatcher {
    matchers: Vec<Box<dyn RequestMatcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn RequestMatcher>>) -> Result<Self> {
        if matchers.len() < 2 {
            return Err(Error::invalid("AndMatcher must have at least two matchers"));
        }
        Ok(Self { matchers })
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl RequestMatcher for AndMatcher {
    fn matches(&self, request: &HttpRequest) -> Result<bool> {
        for matcher in &self.matchers {
            if !matcher.matches(request)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Display for AndMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("matching all of")?;
        for matcher in &self.matchers {
            write!(f, "\n  {}", indent(&matcher.to_string()))?;
        }
        Ok(())
    }
}

impl fmt::Debug for AndMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AndMatcher")
            .field("matchers", &self.matchers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Publisher, Subscriber};
    use crate::request::{BodyPublisher, BodyPublishers};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn get(uri: &str) -> HttpRequest {
        HttpRequest::builder(uri).build().unwrap()
    }

    fn boxed(matcher: impl RequestMatcher + 'static) -> Box<dyn RequestMatcher> {
        Box::new(matcher)
    }

    fn post(uri: &str, body: &str) -> HttpRequest {
        HttpRequest::builder(uri)
            .post(BodyPublishers::of_string(body))
            .build()
            .unwrap()
    }

    /// Fixed outcome, counting how often it was asked.
    struct DummyMatcher {
        outcome: bool,
        calls: Arc<AtomicUsize>,
    }

    impl DummyMatcher {
        fn boxed(outcome: bool) -> (Box<dyn RequestMatcher>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let matcher = DummyMatcher {
                outcome,
                calls: calls.clone(),
            };
            (Box::new(matcher), calls)
        }
    }

    impl RequestMatcher for DummyMatcher {
        fn matches(&self, _request: &HttpRequest) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome)
        }
    }

    impl fmt::Display for DummyMatcher {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "always {}", self.outcome)
        }
    }

    struct SilentPublisher {
        parked: Mutex<Vec<Box<dyn Subscriber<Bytes>>>>,
    }

    impl Publisher<Bytes> for SilentPublisher {
        fn subscribe(&self, subscriber: Box<dyn Subscriber<Bytes>>) {
            self.parked.lock().unwrap().push(subscriber);
        }
    }

    impl BodyPublisher for SilentPublisher {
        fn content_length(&self) -> Option<u64> {
            None
        }
    }

    #[test]
    fn test_uri_exact_match() {
        let matcher = UriMatcher::new("http://example.com/path?q=1").unwrap();
        assert!(matcher.matches(&get("http://example.com/path?q=1")).unwrap());
        assert!(!matcher.matches(&get("http://example.com/path?q=2")).unwrap());
        assert!(!matcher.matches(&get("http://example.com/path")).unwrap());
        assert!(!matcher.matches(&get("https://example.com/path?q=1")).unwrap());
        assert!(!matcher.matches(&get("http://example.com/path?q=1#frag")).unwrap());
    }

    #[test]
    fn test_uri_normalized_before_comparing() {
        let matcher = UriMatcher::new("http://example.com").unwrap();
        assert!(matcher.matches(&get("http://example.com/")).unwrap());
        assert!(matcher.matches(&get("HTTP://EXAMPLE.com:80")).unwrap());
        assert_eq!(matcher.to_string(), "with uri 'http://example.com/'");

        let matcher = UriMatcher::new("http://example.com/Path").unwrap();
        assert!(!matcher.matches(&get("http://example.com/path")).unwrap());
    }

    #[test]
    fn test_uri_rejects_invalid() {
        let err = UriMatcher::new("no scheme here").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_uri_display() {
        let matcher = UriMatcher::new("http://example.com/a").unwrap();
        assert_eq!(matcher.to_string(), "with uri 'http://example.com/a'");
    }

    #[test]
    fn test_header_value_match() {
        let matcher = HeaderMatcher::new("Content-Type", Some("application/json")).unwrap();

        let request = HttpRequest::builder("http://example.com")
            .header("Content-Type", "application/json")
            .build()
            .unwrap();
        assert!(matcher.matches(&request).unwrap());

        let request = HttpRequest::builder("http://example.com")
            .header("Content-Type", "text/plain")
            .build()
            .unwrap();
        assert!(!matcher.matches(&request).unwrap());

        assert!(!matcher.matches(&get("http://example.com")).unwrap());
    }

    #[test]
    fn test_header_name_is_case_insensitive() {
        let matcher = HeaderMatcher::new("Content-Type", Some("application/json")).unwrap();
        let request = HttpRequest::builder("http://example.com")
            .header("content-type", "application/json")
            .build()
            .unwrap();
        assert!(matcher.matches(&request).unwrap());
    }

    #[test]
    fn test_header_value_among_many() {
        let matcher = HeaderMatcher::new("Accept", Some("application/json")).unwrap();
        let request = HttpRequest::builder("http://example.com")
            .header("Accept", "text/plain")
            .header("Accept", "application/json")
            .build()
            .unwrap();
        assert!(matcher.matches(&request).unwrap());
    }

    #[test]
    fn test_header_absent() {
        let matcher = HeaderMatcher::absent("Content-Type").unwrap();
        assert!(matcher.matches(&get("http://example.com")).unwrap());

        let request = HttpRequest::builder("http://example.com")
            .header("Content-Type", "someValue")
            .build()
            .unwrap();
        assert!(!matcher.matches(&request).unwrap());
    }

    #[test]
    fn test_header_empty_value() {
        let matcher = HeaderMatcher::new("Empty-Header", Some("")).unwrap();

        let with_empty = HttpRequest::builder("http://example.com")
            .header("Empty-Header", "")
            .build()
            .unwrap();
        assert!(matcher.matches(&with_empty).unwrap());

        let with_value = HttpRequest::builder("http://example.com")
            .header("Empty-Header", "not-empty")
            .build()
            .unwrap();
        assert!(!matcher.matches(&with_value).unwrap());

        assert!(!matcher.matches(&get("http://example.com")).unwrap());
    }

    #[test]
    fn test_header_rejects_bad_names() {
        let err = HeaderMatcher::new("", Some("x")).unwrap_err();
        assert_eq!(err.to_string(), "header name can not be empty");
        assert!(HeaderMatcher::new("   ", None).is_err());
        assert!(matches!(
            HeaderMatcher::new("bad name", None).unwrap_err(),
            Error::InvalidHeader { .. }
        ));
    }

    #[test]
    fn test_header_display() {
        let with_value = HeaderMatcher::new("X-Token", Some("abc")).unwrap();
        assert_eq!(with_value.to_string(), "with header 'x-token' equal to 'abc'");

        let absent = HeaderMatcher::absent("X-Token").unwrap();
        assert_eq!(absent.to_string(), "without header 'x-token'");
    }

    #[test]
    fn test_body_exact_match() {
        let matcher = BodyMatcher::new("Hello, World!");
        assert!(matcher.matches(&post("http://example.com", "Hello, World!")).unwrap());
        assert!(!matcher.matches(&post("http://example.com", "Goodbye, World!")).unwrap());
        assert!(!matcher.matches(&post("http://example.com", "hello, world!")).unwrap());
    }

    #[test]
    fn test_body_absent_never_matches() {
        assert!(!BodyMatcher::new("").matches(&get("http://example.com")).unwrap());
        assert!(!BodyMatcher::new("Hello").matches(&get("http://example.com")).unwrap());
    }

    #[test]
    fn test_body_empty_matches_empty() {
        let matcher = BodyMatcher::new("");
        assert!(matcher.matches(&post("http://example.com", "")).unwrap());

        let request = HttpRequest::builder("http://example.com")
            .post(BodyPublishers::no_body())
            .build()
            .unwrap();
        assert!(matcher.matches(&request).unwrap());
    }

    #[test]
    fn test_body_chunks_are_joined() {
        let request = HttpRequest::builder("http://example.com")
            .put(BodyPublishers::of_chunks(["Hello, ", "World", "!"]))
            .build()
            .unwrap();
        assert!(BodyMatcher::new("Hello, World!").matches(&request).unwrap());
    }

    #[test]
    fn test_body_regex_matches_whole_body() {
        let matcher = BodyMatcher::regex("Hello, [a-zA-Z]+!").unwrap();
        assert!(matcher.matches(&post("http://example.com", "Hello, World!")).unwrap());
        assert!(!matcher.matches(&post("http://example.com", "Hello")).unwrap());
        assert!(!matcher.matches(&post("http://example.com", "Say Hello, World!")).unwrap());
        assert!(!matcher.matches(&post("http://example.com", "Hello, World!!")).unwrap());
    }

    #[test]
    fn test_body_regex_multipart() {
        let data = r#"{"data":{"name":"notes.json","size":23}}"#;
        let file = r#"{"key":"updated_value"}"#;
        let body = format!(
            "------Boundary1755671153866\r\n\
             Content-Disposition: form-data; name=\"data\"\r\n\
             Content-Type: application/json\r\n\
             \r\n\
             {data}\r\n\
             ------Boundary1755671153866\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"notes.json\"\r\n\
             Content-Type: application/json\r\n\
             \r\n\
             {file}\r\n\
             ------Boundary1755671153866--\r\n"
        );
        let pattern = format!(
            "------Boundary\\d+\\r\\n\
             Content-Disposition: form-data; name=\"data\"\\r\\n\
             Content-Type: application/json\\r\\n\
             \\r\\n\
             {}\\r\\n\
             ------Boundary\\d+\\r\\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"notes\\.json\"\\r\\n\
             Content-Type: application/json\\r\\n\
             \\r\\n\
             {}\\r\\n\
             ------Boundary\\d+--\\r\\n",
            regex::escape(data),
            regex::escape(file)
        );

        let matcher = BodyMatcher::regex(&pattern).unwrap();
        assert!(matcher.matches(&post("http://example.com", &body)).unwrap());
    }

    #[test]
    fn test_body_regex_rejects_bad_pattern() {
        let err = BodyMatcher::regex("(unclosed").unwrap_err();
        assert!(matches!(err, Error::InvalidPattern(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_body_read_timeout_propagates() {
        let request = HttpRequest::builder("http://example.com")
            .post(SilentPublisher {
                parked: Mutex::new(Vec::new()),
            })
            .build()
            .unwrap();
        let err = BodyMatcher::new("anything")
            .with_timeout(Duration::from_millis(30))
            .matches(&request)
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_body_display() {
        assert_eq!(BodyMatcher::new("{}").to_string(), "with body '{}'");
        assert_eq!(
            BodyMatcher::regex("a+").unwrap().to_string(),
            "with body matching 'a+'"
        );
    }

    #[test]
    fn test_and_requires_two_matchers() {
        let err = AndMatcher::new(Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "AndMatcher must have at least two matchers");

        let (only, _) = DummyMatcher::boxed(true);
        assert!(AndMatcher::new(vec![only]).is_err());
    }

    #[test]
    fn test_and_all_must_match() {
        let (a, _) = DummyMatcher::boxed(true);
        let (b, _) = DummyMatcher::boxed(true);
        let matcher = AndMatcher::new(vec![a, b]).unwrap();
        assert!(matcher.matches(&get("http://example.com")).unwrap());
        assert_eq!(matcher.len(), 2);

        let (a, _) = DummyMatcher::boxed(true);
        let (b, _) = DummyMatcher::boxed(false);
        let matcher = AndMatcher::new(vec![a, b]).unwrap();
        assert!(!matcher.matches(&get("http://example.com")).unwrap());
    }

    #[test]
    fn test_and_short_circuits() {
        let (first, first_calls) = DummyMatcher::boxed(false);
        let (second, second_calls) = DummyMatcher::boxed(true);
        let matcher = AndMatcher::new(vec![first, second]).unwrap();

        assert!(!matcher.matches(&get("http://example.com")).unwrap());
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_and_combines_real_matchers() {
        let matcher = AndMatcher::new(vec![
            boxed(UriMatcher::new("http://example.com/login").unwrap()),
            boxed(HeaderMatcher::new("Authorization", Some("Bearer t")).unwrap()),
            boxed(BodyMatcher::new("user=me")),
        ])
        .unwrap();

        let request = HttpRequest::builder("http://example.com/login")
            .header("Authorization", "Bearer t")
            .post(BodyPublishers::of_string("user=me"))
            .build()
            .unwrap();
        assert!(matcher.matches(&request).unwrap());

        let request = HttpRequest::builder("http://example.com/login")
            .post(BodyPublishers::of_string("user=me"))
            .build()
            .unwrap();
        assert!(!matcher.matches(&request).unwrap());
    }

    #[test]
    fn test_and_display_indents_children() {
        let inner = AndMatcher::new(vec![
            boxed(HeaderMatcher::absent("X-A").unwrap()),
            boxed(BodyMatcher::new("b")),
        ])
        .unwrap();
        let outer = AndMatcher::new(vec![
            boxed(UriMatcher::new("http://x/y").unwrap()),
            boxed(inner),
        ])
        .unwrap();

        assert_eq!(
            outer.to_string(),
            "matching all of\n  with uri 'http://x/y'\n  matching all of\n    without header 'x-a'\n    with body 'b'"
        );
    }

    #[test]
    fn test_indent_skips_empty_lines() {
        assert_eq!(indent("one"), "one");
        assert_eq!(indent("one\ntwo"), "one\n  two");
        assert_eq!(indent("one\ntwo\n"), "one\n  two\n");
        assert_eq!(indent("one\n\nthree"), "one\n\n  three");
    }

    #[test]
    fn test_and_display_with_trailing_newline_child() {
        struct Multiline;

        impl RequestMatcher for Multiline {
            fn matches(&self, _request: &HttpRequest) -> Result<bool> {
                Ok(true)
            }
        }

        impl fmt::Display for Multiline {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("custom\nsecond line\n")
            }
        }

        let matcher = AndMatcher::new(vec![boxed(Multiline), boxed(BodyMatcher::new("b"))]).unwrap();
        assert_eq!(
            matcher.to_string(),
            "matching all of\n  custom\n  second line\n\n  with body 'b'"
        );
    }
}
