//! Stubbed responses and what the client hands back.
//!
//! A [`StubResponse`] holds the raw content a server would have sent. When it is
//! delivered, the caller's body handler decodes that content and the client
//! returns an [`HttpResponse`] carrying both the raw content and the decoded body.

use crate::config::Version;
use crate::error::{Error, Result};
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use std::path::Path;
use url::Url;

/// Response metadata, available to body handlers before the body is decoded.
pub trait ResponseInfo {
    fn status_code(&self) -> u16;
    fn headers(&self) -> &HeaderMap;
    fn version(&self) -> Version;
}

/// A canned response, configured with fluent setters.
///
/// Every content setter (`content`, `text`, `html`, `json`, `file`) replaces
/// the content together with the `Content-Type` and `Content-Length` headers.
#[derive(Debug, Clone)]
pub struct StubResponse {
    status: u16,
    headers: HeaderMap,
    content: Bytes,
    version: Version,
}

impl Default for StubResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            content: Bytes::new(),
            version: Version::Http2,
        }
    }
}

impl StubResponse {
    /// An empty `200` response.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: impl Into<u16>) -> Self {
        self.status = status.into();
        self
    }

    pub fn set_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Raw bytes, served as `application/octet-stream`.
    pub fn content(self, content: impl Into<Bytes>) -> Self {
        self.with_content(
            content.into(),
            HeaderValue::from_static("application/octet-stream"),
        )
    }

    pub fn text(self, body: impl Into<String>) -> Self {
        self.with_content(Bytes::from(body.into()), HeaderValue::from_static("text/plain"))
    }

    pub fn html(self, body: impl Into<String>) -> Self {
        self.with_content(Bytes::from(body.into()), HeaderValue::from_static("text/html"))
    }

    pub fn json(self, body: impl Into<String>) -> Self {
        self.with_content(
            Bytes::from(body.into()),
            HeaderValue::from_static("application/json"),
        )
    }

    /// Content of the file at `path`, with a MIME type guessed from its name.
    pub fn file(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|source| Error::Resource {
            path: path.to_path_buf(),
            source,
        })?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let content_type = HeaderValue::from_str(mime.as_ref())
            .map_err(|e| Error::invalid_header(CONTENT_TYPE.as_str(), e))?;
        Ok(self.with_content(Bytes::from(content), content_type))
    }

    /// Set `key` to the single value `value`, or remove it when `value` is `None`.
    pub fn header(mut self, key: &str, value: Option<&str>) -> Result<Self> {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| Error::invalid_header(key, e))?;
        match value {
            Some(value) => {
                let value = HeaderValue::from_str(value).map_err(|e| Error::invalid_header(key, e))?;
                self.headers.insert(name, value);
            }
            None => {
                self.headers.remove(name);
            }
        }
        Ok(self)
    }

    /// Replace every header.
    pub fn set_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Override only the content type, keeping the content.
    pub fn content_type(self, content_type: &str) -> Result<Self> {
        self.header(CONTENT_TYPE.as_str(), Some(content_type))
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The bytes a server would have sent.
    pub fn raw_content(&self) -> &Bytes {
        &self.content
    }

    /// The first `Content-Type` value, if any.
    pub fn mime_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    fn with_content(mut self, content: Bytes, content_type: HeaderValue) -> Self {
        self.headers.insert(CONTENT_TYPE, content_type);
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(content.len()));
        self.content = content;
        self
    }
}

impl ResponseInfo for StubResponse {
    fn status_code(&self) -> u16 {
        self.status
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn version(&self) -> Version {
        self.version
    }
}

/// What a matched stub answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Deliver this response.
    Respond(StubResponse),
    /// Fail the call as if the network had gone away.
    NetworkError,
}

impl Reply {
    pub fn network_error() -> Self {
        Reply::NetworkError
    }

    pub fn is_network_error(&self) -> bool {
        matches!(self, Reply::NetworkError)
    }
}

impl Default for Reply {
    fn default() -> Self {
        Reply::Respond(StubResponse::default())
    }
}

impl From<StubResponse> for Reply {
    fn from(response: StubResponse) -> Self {
        Reply::Respond(response)
    }
}

/// A delivered response: the stub's metadata and raw content plus the body
/// decoded by the caller's handler.
#[derive(Debug, Clone)]
pub struct HttpResponse<T> {
    status: u16,
    headers: HeaderMap,
    version: Version,
    uri: Url,
    content: Bytes,
    body: T,
}

impl<T> HttpResponse<T> {
    pub(crate) fn delivered(stub: &StubResponse, uri: Url, body: T) -> Self {
        Self {
            status: stub.status,
            headers: stub.headers.clone(),
            version: stub.version,
            uri,
            content: stub.content.clone(),
            body,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// URI of the request this response answers.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// The raw content the stub served.
    pub fn raw_content(&self) -> &Bytes {
        &self.content
    }

    /// The decoded body.
    pub fn body(&self) -> &T {
        &self.body
    }

    pub fn into_body(self) -> T {
        self.body
    }
}

impl<T> ResponseInfo for HttpResponse<T> {
    fn status_code(&self) -> u16 {
        self.status
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn version(&self) -> Version {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::HttpStatus;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let response = StubResponse::new();
        assert_eq!(response.status_code(), 200);
        assert!(response.headers().is_empty());
        assert!(response.raw_content().is_empty());
        assert_eq!(response.version(), Version::Http2);
        assert_eq!(response.mime_type(), None);
    }

    #[test]
    fn test_json_sets_type_length_and_bytes() {
        let body = "{\"a\":1}";
        let response = StubResponse::new().json(body);
        assert_eq!(response.mime_type(), Some("application/json"));
        assert_eq!(response.headers()[CONTENT_LENGTH], body.len().to_string().as_str());
        assert_eq!(response.raw_content().as_ref(), body.as_bytes());
    }

    #[test]
    fn test_length_counts_utf8_bytes() {
        let response = StubResponse::new().text("héllo");
        assert_eq!(response.headers()[CONTENT_LENGTH], "6");
        assert_eq!(response.mime_type(), Some("text/plain"));

        let response = StubResponse::new().html("<p>ü</p>");
        assert_eq!(response.headers()[CONTENT_LENGTH], "9");
        assert_eq!(response.mime_type(), Some("text/html"));
    }

    #[test]
    fn test_content_is_octet_stream() {
        let response = StubResponse::new().content(vec![1u8, 2, 3]);
        assert_eq!(response.mime_type(), Some("application/octet-stream"));
        assert_eq!(response.headers()[CONTENT_LENGTH], "3");
        assert_eq!(response.raw_content().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn test_content_setter_overwrites_type_and_length() {
        let response = StubResponse::new()
            .header("Content-Type", Some("image/png"))
            .unwrap()
            .header("X-Custom", Some("kept"))
            .unwrap()
            .text("plain");
        assert_eq!(response.mime_type(), Some("text/plain"));
        assert_eq!(response.headers()["x-custom"], "kept");
        assert_eq!(response.headers().get_all(CONTENT_TYPE).iter().count(), 1);
    }

    #[test]
    fn test_header_replaces_and_removes() {
        let response = StubResponse::new()
            .header("X-Token", Some("one"))
            .unwrap()
            .header("x-token", Some("two"))
            .unwrap();
        let values: Vec<_> = response.headers().get_all("X-Token").iter().collect();
        assert_eq!(values, vec!["two"]);

        let response = StubResponse::new().text("hi").header("Content-Length", None).unwrap();
        assert!(response.headers().get(CONTENT_LENGTH).is_none());
        assert_eq!(response.mime_type(), Some("text/plain"));

        assert!(StubResponse::new().header("bad key", Some("v")).is_err());
        assert!(StubResponse::new().header("X-Ok", Some("bad\nvalue")).is_err());
    }

    #[test]
    fn test_content_type_override_keeps_content() {
        let response = StubResponse::new()
            .text("{}")
            .content_type("application/vnd.api+json")
            .unwrap();
        assert_eq!(response.mime_type(), Some("application/vnd.api+json"));
        assert_eq!(response.raw_content().as_ref(), b"{}");
    }

    #[test]
    fn test_file_probes_mime_type() {
        let mut file = tempfile::Builder::new().suffix(".html").tempfile().unwrap();
        file.write_all(b"<html></html>").unwrap();

        let response = StubResponse::new().file(file.path()).unwrap();
        assert_eq!(response.mime_type(), Some("text/html"));
        assert_eq!(response.headers()[CONTENT_LENGTH], "13");
        assert_eq!(response.raw_content().as_ref(), b"<html></html>");
    }

    #[test]
    fn test_file_unknown_extension_is_octet_stream() {
        let mut file = tempfile::Builder::new().suffix(".zzzunknown").tempfile().unwrap();
        file.write_all(&[0, 1]).unwrap();

        let response = StubResponse::new().file(file.path()).unwrap();
        assert_eq!(response.mime_type(), Some("application/octet-stream"));
    }

    #[test]
    fn test_file_unreadable_is_resource_error() {
        let err = StubResponse::new().file("/no/such/file.json").unwrap_err();
        match err {
            Error::Resource { path, .. } => assert_eq!(path, Path::new("/no/such/file.json")),
            other => panic!("Expected Resource error, got {:?}", other),
        }
    }

    #[test]
    fn test_status_and_version() {
        let response = StubResponse::new()
            .status(HttpStatus::NotFound)
            .set_version(Version::Http11);
        assert_eq!(response.status_code(), 404);
        assert_eq!(response.version(), Version::Http11);

        assert_eq!(StubResponse::new().status(418u16).status_code(), 418);
    }

    #[test]
    fn test_reply_kinds() {
        assert!(Reply::network_error().is_network_error());
        assert!(!Reply::from(StubResponse::new()).is_network_error());
        assert!(matches!(Reply::default(), Reply::Respond(r) if r.status_code() == 200));
    }
}
